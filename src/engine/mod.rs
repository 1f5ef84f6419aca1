//! 代付交易引擎：构建由 fee payer 签名的 swap 与转账，登记已发出的交易并负责落地。

mod assembler;
mod auth;
mod builder;
mod error;
mod fee;
mod identity;
mod quote;
mod rebuild;
mod registry;
mod service;
mod stream;
mod submitter;
mod transfer;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use assembler::{SwapAssembler, SwapBuilder, select_slippage};
pub use auth::{AuthError, AuthService, StaticTokenAuth, UserContext, WalletAddressAuth};
pub use builder::{CompiledMessage, PACKET_DATA_SIZE, TransactionBuilder};
pub use error::{SponsorError, SponsorResult};
pub use fee::{FeeService, SponsoredToken};
pub use identity::FeePayer;
pub(crate) use identity::parse_keypair_string;
pub use quote::{
    JupiterPriceOracle, JupiterQuoteProvider, PriceOracle, QuoteProvider, RouteParams, RoutePlan,
};
pub use rebuild::RebuildCoordinator;
pub use registry::{TransactionRegistry, message_key};
pub use service::{SponsorComponents, SponsorService};
pub use stream::{StreamUpdate, SwapSource, SwapStream, SwapStreamRegistry};
pub use submitter::{PreparedMessage, RegistrationMeta, SwapRebuilder, TransactionSubmitter};
pub use transfer::TransferAssembler;
pub use types::{
    ActiveSwapRequest, PresignedSwapResponse, RebuildSnapshot, ResponseType, SubmissionOutcome,
    SubmissionResponse, SwapRequest, SwapResponse, TransactionRegistryEntry, TransactionType,
    TransferFeeEstimate, TransferRequest, TransferResponse,
};
