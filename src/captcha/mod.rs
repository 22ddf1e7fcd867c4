pub mod sitekey;
pub mod solver;

pub use solver::{response_token, CaptchaError, CaptchaResolver, TwoCaptcha};
