//! Mesh vertices used as attraction targets.
//!
//! Only the vertex positions of a Wavefront OBJ file are used. Loading runs
//! on a background thread as one sequential job (mesh A, then mesh B) whose
//! single result the event loop picks up with [`MeshLoader::poll`].

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use glam::Vec3;

use crate::error::MeshError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
}

impl Mesh {
    /// Collect every `v x y z` record. Other records are skipped.
    pub fn parse_obj(text: &str) -> Result<Self, MeshError> {
        let mut vertices = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let mut fields = line.split_whitespace();
            if fields.next() != Some("v") {
                continue;
            }

            let parse_error = || MeshError::Parse {
                line: index + 1,
                record: line.trim().to_string(),
            };
            let mut coord = || -> Result<f32, MeshError> {
                fields
                    .next()
                    .ok_or_else(parse_error)?
                    .parse()
                    .map_err(|_| parse_error())
            };
            let (x, y, z) = (coord()?, coord()?, coord()?);
            vertices.push(Vec3::new(x, y, z));
        }

        Ok(Self { vertices })
    }

    pub fn load_obj(path: impl AsRef<Path>) -> Result<Self, MeshError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| MeshError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mesh = Self::parse_obj(&text)?;
        log::info!("loaded {} vertices from {}", mesh.vertices.len(), path.display());
        Ok(mesh)
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Both attraction meshes, delivered together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshPair {
    pub mesh_a: Mesh,
    pub mesh_b: Mesh,
}

/// Background load of mesh A followed by mesh B.
pub struct MeshLoader {
    receiver: Option<Receiver<Result<MeshPair, MeshError>>>,
}

impl MeshLoader {
    /// Start loading. A failure on A skips B.
    pub fn spawn(path_a: PathBuf, path_b: PathBuf) -> Self {
        let (sender, receiver) = mpsc::channel();

        thread::spawn(move || {
            let result = Mesh::load_obj(&path_a).and_then(|mesh_a| {
                let mesh_b = Mesh::load_obj(&path_b)?;
                Ok(MeshPair { mesh_a, mesh_b })
            });
            let _ = sender.send(result);
        });

        Self {
            receiver: Some(receiver),
        }
    }

    /// Non-blocking check for the result. Yields it at most once.
    pub fn poll(&mut self) -> Option<Result<MeshPair, MeshError>> {
        let receiver = self.receiver.as_ref()?;
        let result = match receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(MeshError::Disconnected),
        };
        self.receiver = None;
        Some(result)
    }

    /// Whether a result is still outstanding.
    pub fn is_pending(&self) -> bool {
        self.receiver.is_some()
    }
}
