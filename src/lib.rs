//! DOFF Dynamic Loader Library.
//!
//! This library reads DOFF modules produced for TI DSP targets and loads
//! them into target memory. It is organized into several modules:
//! - `doff`, `checksum`, `units`: the file format and its arithmetic.
//! - `module`, `packet`: opening a module and streaming its sections.
//! - `arch`, `reloc`, `cinit`: per-target relocation and initialization.
//! - `loader`, `symbol`, `target`: full loads into target memory.
//! - `stream`, `host`: the collaborators a load is driven through.
//! - `config`: CLI configuration.

pub mod arch;
pub mod checksum;
pub mod cinit;
pub mod config;
pub mod doff;
pub mod error;
pub mod host;
pub mod loader;
pub mod module;
pub mod packet;
pub mod reloc;
pub mod section;
pub mod stream;
pub mod strings;
pub mod symbol;
pub mod target;
pub mod units;
pub mod utils;

pub use arch::{HostProfile, LoadOptions, TargetFamily, TargetProfile};
pub use error::{LoadError, Result};
pub use host::{DefaultSyms, HostSyms};
pub use loader::ModuleImage;
pub use module::{Loader, Module};
pub use section::{SectionFlags, SectionInfo, SectionType};
pub use stream::{IoStream, MemoryStream, Stream};
pub use target::{BumpAllocator, TargetAllocator, TargetInitializer, TargetMemory};
