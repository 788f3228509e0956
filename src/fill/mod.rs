pub mod format;
pub mod markup;
pub mod tags;
pub mod text;
pub mod values;

pub use format::{format_value, ValueKind};
pub use markup::{replace_in_markup, FillReport, MarkupFill, MarkupSettings};
pub use text::render_text;
pub use values::{ResolvedValue, ResolvedValues};
