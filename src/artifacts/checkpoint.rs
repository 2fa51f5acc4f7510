use std::{collections::HashMap, fs, path::Path};

use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{Result, WganErr};

const GENERATOR: &str = "generator";
const RUNNING_STATS: &str = "generator.running_stats";

/// A snapshot of the generator, the only network needed to generate samples later on.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    /// The global step counter when the snapshot was taken.
    pub step: u64,
    /// The amount of completed epochs.
    pub epoch: usize,
    pub generator: Vec<f32>,
    /// The normalization statistics the generator uses at inference time.
    pub running_stats: Vec<f32>,
}

impl Checkpoint {
    /// The file name of the checkpoint for a given 1-based epoch.
    pub fn file_name(name: &str, epoch: usize) -> String {
        format!("{name}-e{epoch:03}.ckpt")
    }

    /// Encodes the checkpoint as a safetensors buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let generator: &[u8] = bytemuck::cast_slice(&self.generator);
        let running_stats: &[u8] = bytemuck::cast_slice(&self.running_stats);

        let views = [
            (GENERATOR, view(generator, self.generator.len())?),
            (RUNNING_STATS, view(running_stats, self.running_stats.len())?),
        ];

        let metadata = HashMap::from([
            ("step".to_string(), self.step.to_string()),
            ("epoch".to_string(), self.epoch.to_string()),
        ]);

        safetensors::serialize(views, &Some(metadata)).map_err(|e| WganErr::Checkpoint(e.to_string()))
    }

    /// Decodes a buffer made by `to_bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (_, metadata) =
            SafeTensors::read_metadata(bytes).map_err(|e| WganErr::Checkpoint(e.to_string()))?;
        let metadata = metadata
            .metadata()
            .as_ref()
            .ok_or_else(|| WganErr::Checkpoint("missing metadata".into()))?;

        let field = |key: &str| {
            metadata
                .get(key)
                .ok_or_else(|| WganErr::Checkpoint(format!("missing `{key}` metadata")))
        };

        let step = field("step")?
            .parse()
            .map_err(|e| WganErr::Checkpoint(format!("bad `step` metadata: {e}")))?;
        let epoch = field("epoch")?
            .parse()
            .map_err(|e| WganErr::Checkpoint(format!("bad `epoch` metadata: {e}")))?;

        let tensors = SafeTensors::deserialize(bytes).map_err(|e| WganErr::Checkpoint(e.to_string()))?;

        Ok(Self {
            step,
            epoch,
            generator: read_f32(&tensors, GENERATOR)?,
            running_stats: read_f32(&tensors, RUNNING_STATS)?,
        })
    }

    /// Reads a checkpoint file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| WganErr::Checkpoint(format!("couldn't read {}: {e}", path.display())))?;

        Self::from_bytes(&bytes)
    }
}

fn view(bytes: &[u8], len: usize) -> Result<TensorView<'_>> {
    TensorView::new(Dtype::F32, vec![len], bytes).map_err(|e| WganErr::Checkpoint(e.to_string()))
}

fn read_f32(tensors: &SafeTensors<'_>, name: &str) -> Result<Vec<f32>> {
    let tensor = tensors
        .tensor(name)
        .map_err(|e| WganErr::Checkpoint(format!("tensor `{name}`: {e}")))?;

    if tensor.dtype() != Dtype::F32 || tensor.shape().len() != 1 {
        return Err(WganErr::Checkpoint(format!(
            "tensor `{name}` must be a flat f32 vector, got {:?} {:?}",
            tensor.dtype(),
            tensor.shape()
        )));
    }

    let values = tensor
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint() -> Checkpoint {
        Checkpoint {
            step: 1234,
            epoch: 3,
            generator: vec![0.5, -1.25, f32::MIN_POSITIVE, 3.0e7],
            running_stats: vec![0.1, 0.9],
        }
    }

    #[test]
    fn decodes_what_it_encodes() {
        let ckpt = checkpoint();

        let decoded = Checkpoint::from_bytes(&ckpt.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded, ckpt);
    }

    #[test]
    fn empty_running_stats_are_allowed() {
        let ckpt = Checkpoint {
            running_stats: Vec::new(),
            ..checkpoint()
        };

        let decoded = Checkpoint::from_bytes(&ckpt.to_bytes().unwrap()).unwrap();

        assert!(decoded.running_stats.is_empty());
    }

    #[test]
    fn garbage_is_a_checkpoint_error() {
        assert!(matches!(
            Checkpoint::from_bytes(b"not a checkpoint"),
            Err(WganErr::Checkpoint(_))
        ));
    }

    #[test]
    fn file_names_are_versioned_by_epoch() {
        assert_eq!(Checkpoint::file_name("wgan", 7), "wgan-e007.ckpt");
    }
}
