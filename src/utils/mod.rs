pub mod code_generator;
pub mod email;
pub mod signature;

pub use code_generator::{CODE_ALPHABET, generate_code, generate_code_batch};
pub use email::is_valid_email;
pub use signature::sign_payload;
