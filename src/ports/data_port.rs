//! Data access port trait.

use crate::domain::assets::AssetUniverse;
use crate::domain::engine::MarketData;
use crate::domain::error::NeutronError;

pub trait DataPort {
    /// Load daily OHLC and intraday close panels for every asset in the
    /// universe. Assets without any daily history are skipped; the panels'
    /// indexes are the sorted unions of the per-asset timestamps.
    fn load_market_data(&self, universe: &AssetUniverse) -> Result<MarketData, NeutronError>;
}
