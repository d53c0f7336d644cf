pub mod common;
pub mod engine;
pub mod grid_state;
pub mod orders;
pub mod pricing;
pub mod snapshot;
pub mod trend;

pub use common::{Candle, Ohlc};
pub use engine::{compute_indicators, IndicatorInput, IndicatorOutput};
pub use orders::{AnnotatedOrder, OpenOrder, OrderSide};
pub use pricing::Restriction;
pub use snapshot::{BuySnapshot, Indicators, SellSnapshot};
