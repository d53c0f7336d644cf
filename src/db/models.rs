use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};

use crate::{
    config::symbol::SymbolConfiguration,
    services::indicators::Candle,
};

use super::store::{ActiveGrid, GridTradeArchive, OverrideAction};

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct CandleRow {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl From<CandleRow> for Candle {
    fn from(r: CandleRow) -> Self {
        Candle {
            open_time: r.open_time,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct SymbolConfigurationRow {
    pub symbol: String,
    pub document: Json<SymbolConfiguration>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
pub struct ArchiveRow {
    pub archive_id: i64,
    pub document: Json<GridTradeArchive>,
}

#[derive(Debug, FromRow)]
pub struct ActiveGridRow {
    pub symbol: String,
    pub document: Json<ActiveGrid>,
}

#[derive(Debug, FromRow)]
pub struct OverrideActionRow {
    pub action_id: i64,
    pub scope: String,
    pub document: Json<OverrideAction>,
}
