pub mod caching;
pub mod esplora;
pub mod ethplorer;
pub mod market_price;
pub mod spot_price;
pub mod tronscan;
pub mod util;

pub use caching::CachingPriceSource;
pub use esplora::EsploraProvider;
pub use ethplorer::EthplorerProvider;
pub use market_price::MarketPriceProvider;
pub use spot_price::SpotPriceProvider;
pub use tronscan::TronscanProvider;
