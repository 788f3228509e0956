pub mod package;
pub mod text;
pub mod xml;

pub use package::DocxPackage;
pub use text::{decode_docx, default_output_for, encode_docx, DecodedDocument};
