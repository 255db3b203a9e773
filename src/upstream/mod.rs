pub mod alpha_vantage;
pub mod listing;
pub mod retry;
pub mod transport;

pub use alpha_vantage::{AlphaVantageClient, Signal};
pub use listing::{CoinMarket, ListingClient};
pub use retry::{FetchResult, RetryPolicy, UpstreamFetcher};
pub use transport::{HttpTransport, JsonTransport};
