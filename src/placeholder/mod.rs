pub mod catalog;
pub mod context;
pub mod patterns;
pub mod scanner;

pub use catalog::{priority_rank, sort_by_priority, Catalog, PlaceholderDescriptor, PlaceholderId};
pub use context::{ContextResolver, ContextWindows, PartyMarkers, PartyStrategy};
pub use patterns::{LabelField, Party, PlaceholderKind};
pub use scanner::{scan, scan_with, ScanSettings};
