//! # Spool Registry
//!
//! Resolves format transitions and file types to concrete providers.
//!
//! ```ignore
//! let registry = Arc::new(RegistryBuilder::with_defaults().build());
//! let mut reader = registry.open_reader(Path::new("capture.avi"))?;
//! let codec = registry.get_codec(&track_format, &wanted)?;
//! ```

pub mod error;
pub mod provider;
pub mod registry;

pub use error::RegistryError;
pub use provider::{CodecProvider, ProviderRole, ReaderProvider, WriterProvider};
pub use registry::{ProviderRegistry, RegistryBuilder};
