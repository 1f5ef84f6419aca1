pub mod jupiter;
pub mod serde_helpers;

pub use jupiter::{
    JupiterApiClient, JupiterError, QuoteRequest, QuoteResponse, QuoteResponsePayload,
    SlippageSetting, SwapInstructionsRequest, SwapInstructionsResponse,
};
