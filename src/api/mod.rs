pub mod client;
pub mod rag;

pub use client::ApiClient;
pub use rag::RagApi;
