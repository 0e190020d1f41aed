//! Code for loading and running the (trained) image-to-text model

use anyhow::{anyhow, Result};
use image::{imageops::FilterType, DynamicImage};
use std::fmt::{self, Debug};
use std::time::Instant;
use tch::{no_grad, CModule, Device, IValue, Kind, Tensor};
use tracing::{debug, info};

/// Dictionary key carrying the decoded text in structured model outputs
pub const GENERATED_TEXT: &str = "generated_text";

/// One decoded sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub generated_text: String,
}

/// The output of a model's inference
#[derive(Debug, Clone, PartialEq)]
pub enum Inference {
    /// Decoded sequences, best first
    Generations(Vec<Generation>),

    /// A model output that was not a sequence of generations, rendered as text
    Raw(String),
}

impl Inference {
    /// The text shown to the caller: the first generation when there is one,
    /// otherwise the rendered output
    pub fn extracted_text(&self) -> String {
        match self {
            Inference::Generations(generations) => match generations.first() {
                Some(first) => first.generated_text.clone(),
                None => self.to_string(),
            },
            Inference::Raw(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for Inference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inference::Generations(generations) => {
                let texts: Vec<&str> = generations
                    .iter()
                    .map(|g| g.generated_text.as_str())
                    .collect();
                write!(f, "{texts:?}")
            }
            Inference::Raw(raw) => write!(f, "{raw}"),
        }
    }
}

/// An image-to-text model. Implementations are loaded once and shared
/// read-only between requests.
pub trait ImageToText: Send + Sync {
    fn generate(&self, image: &DynamicImage) -> Result<Inference>;
}

/// Load and run a TorchScript image-to-text module. The module is expected
/// to take a `[1, 3, H, W]` float image tensor and run its own decoding,
/// returning text.
pub struct TorchModel {
    /// The loaded torch model
    model: CModule,
    device: Device,
    width: u32,
    height: u32,
}

impl Debug for TorchModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TorchModel {{ device: {:?}, input: {}x{} }}",
            self.device, self.width, self.height
        )
    }
}

impl TorchModel {
    pub fn new(filename: &str, device: Device, width: u32, height: u32) -> Result<Self> {
        info!("loading model {filename} on {device:?}");
        let start = Instant::now();
        let mut model = CModule::load_on_device(filename, device)?;
        model.set_eval();
        info!("model loaded in {:.2?}", start.elapsed());
        Ok(TorchModel {
            model,
            device,
            width,
            height,
        })
    }

    /// Resize and normalise an image into a `[1, 3, H, W]` tensor in `[-1, 1]`
    fn to_tensor(&self, image: &DynamicImage) -> Tensor {
        let rgb = image
            .resize_exact(self.width, self.height, FilterType::Lanczos3)
            .to_rgb8();
        let (w, h) = rgb.dimensions();
        let pixels = Tensor::from_slice(rgb.as_raw()).view([h as i64, w as i64, 3]);
        let pixels = pixels.permute([2, 0, 1]).to_kind(Kind::Float) / 255.;
        ((pixels - 0.5) / 0.5).unsqueeze(0).to_device(self.device)
    }
}

impl ImageToText for TorchModel {
    fn generate(&self, image: &DynamicImage) -> Result<Inference> {
        let input = IValue::Tensor(self.to_tensor(image));
        let output = no_grad(|| self.model.forward_is(&[input]))?;
        let inference = interpret(output)?;
        debug!("model output: {inference:?}");
        Ok(inference)
    }
}

/// Parse the device name used in settings
pub fn parse_device(name: &str) -> Result<Device> {
    match name {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Ok(Device::cuda_if_available()),
        other => match other.strip_prefix("cuda:").map(str::parse::<usize>) {
            Some(Ok(n)) => Ok(Device::Cuda(n)),
            _ => Err(anyhow!("unknown device {other:?}")),
        },
    }
}

/// Map a TorchScript output onto an `Inference`. A non-empty sequence is
/// read through its first element, which must carry text.
fn interpret(output: IValue) -> Result<Inference> {
    let inference = match output {
        IValue::String(text) => Inference::Generations(vec![Generation {
            generated_text: text,
        }]),
        IValue::StringList(texts) => Inference::Generations(
            texts
                .into_iter()
                .map(|generated_text| Generation { generated_text })
                .collect(),
        ),
        IValue::GenericList(items) | IValue::Tuple(items) => {
            let mut items = items.into_iter();
            match items.next() {
                None => Inference::Generations(vec![]),
                Some(first) => {
                    let rendered = format!("{first:?}");
                    let first = generation(first).ok_or_else(|| {
                        anyhow!("model output has no {GENERATED_TEXT}: {rendered}")
                    })?;
                    let mut generations = vec![first];
                    generations.extend(items.filter_map(generation));
                    Inference::Generations(generations)
                }
            }
        }
        IValue::GenericDict(entries) => {
            let rendered = format!("{entries:?}");
            match generated_text(entries) {
                Some(generated_text) => {
                    Inference::Generations(vec![Generation { generated_text }])
                }
                None => Inference::Raw(rendered),
            }
        }
        other => Inference::Raw(format!("{other:?}")),
    };
    Ok(inference)
}

/// A single list element: a string or a dict with a `generated_text` entry
fn generation(item: IValue) -> Option<Generation> {
    match item {
        IValue::String(generated_text) => Some(Generation { generated_text }),
        IValue::GenericDict(entries) => {
            generated_text(entries).map(|generated_text| Generation { generated_text })
        }
        _ => None,
    }
}

fn generated_text(entries: Vec<(IValue, IValue)>) -> Option<String> {
    entries.into_iter().find_map(|(key, value)| match (key, value) {
        (IValue::String(key), IValue::String(text)) if key == GENERATED_TEXT => Some(text),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(text: &str) -> IValue {
        IValue::GenericDict(vec![(
            IValue::String(GENERATED_TEXT.into()),
            IValue::String(text.into()),
        )])
    }

    #[test]
    fn test_first_generation_wins() {
        let inference = Inference::Generations(vec![
            Generation {
                generated_text: "TOTAL 12.50".into(),
            },
            Generation {
                generated_text: "TOTAL 12.80".into(),
            },
        ]);
        assert_eq!(inference.extracted_text(), "TOTAL 12.50");
    }

    #[test]
    fn test_empty_generations_render() {
        assert_eq!(Inference::Generations(vec![]).extracted_text(), "[]");
    }

    #[test]
    fn test_raw_render() {
        assert_eq!(Inference::Raw("Int(3)".into()).extracted_text(), "Int(3)");
    }

    #[test]
    fn test_interpret_string() {
        let inference = interpret(IValue::String("<s_menu>coffee".into())).unwrap();
        assert_eq!(inference.extracted_text(), "<s_menu>coffee");
    }

    #[test]
    fn test_interpret_string_list() {
        let inference = interpret(IValue::StringList(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(inference.extracted_text(), "a");
    }

    #[test]
    fn test_interpret_list_of_dicts() {
        let inference = interpret(IValue::GenericList(vec![dict("first"), dict("second")])).unwrap();
        assert_eq!(
            inference,
            Inference::Generations(vec![
                Generation {
                    generated_text: "first".into()
                },
                Generation {
                    generated_text: "second".into()
                },
            ])
        );
    }

    #[test]
    fn test_interpret_dict() {
        assert_eq!(interpret(dict("only")).unwrap().extracted_text(), "only");
    }

    #[test]
    fn test_interpret_other() {
        let inference = interpret(IValue::Int(3)).unwrap();
        assert!(matches!(inference, Inference::Raw(_)));
        assert_eq!(inference.extracted_text(), "Int(3)");
    }

    #[test]
    fn test_interpret_empty_list() {
        let inference = interpret(IValue::GenericList(vec![])).unwrap();
        assert_eq!(inference.extracted_text(), "[]");
    }

    #[test]
    fn test_interpret_reads_first_element() {
        let inference = interpret(IValue::GenericList(vec![dict("first"), IValue::Int(1)])).unwrap();
        assert_eq!(inference.extracted_text(), "first");

        let inference =
            interpret(IValue::Tuple(vec![IValue::String("second".into()), IValue::None])).unwrap();
        assert_eq!(inference.extracted_text(), "second");
    }

    #[test]
    fn test_interpret_first_element_without_text() {
        let err = interpret(IValue::GenericList(vec![IValue::Int(1), dict("later")])).unwrap_err();
        assert!(err.to_string().contains(GENERATED_TEXT), "{err}");

        let untagged = IValue::GenericDict(vec![(
            IValue::String("label".into()),
            IValue::String("total".into()),
        )]);
        assert!(interpret(IValue::GenericList(vec![untagged])).is_err());
    }

    #[test]
    fn test_parse_device() {
        assert_eq!(parse_device("cpu").unwrap(), Device::Cpu);
        assert_eq!(parse_device("cuda:1").unwrap(), Device::Cuda(1));
        assert!(parse_device("tpu").is_err());
        assert!(parse_device("cuda:x").is_err());
    }
}
