mod session;
mod trace;

pub use session::FillSession;
pub use trace::TraceWriter;
