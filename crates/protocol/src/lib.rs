pub mod constants;
pub mod envelope;
pub mod reply;

// Re-export primary types for convenience.
pub use envelope::Envelope;
pub use reply::Reply;
