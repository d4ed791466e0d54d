pub mod gateway;
pub mod media;
pub mod openai;

pub use gateway::{AiGateway, GatewayError};
pub use openai::OpenAiGateway;
