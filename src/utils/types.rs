//! Common types used throughout the engine

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Technical indicators carried in a signal vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Rsi,
    Macd,
    Bollinger,
    Trend,
    Stochastic,
    Cci,
    Adx,
    Sar,
    Ichimoku,
    Volume,
    Fvg,
    Candle,
    WilliamsR,
    Mfi,
}

/// Indicator family, used for regime-specific weight boosts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorFamily {
    TrendFollowing,
    MeanReversion,
    Confirmation,
}

impl Indicator {
    pub const ALL: [Indicator; 14] = [
        Indicator::Rsi,
        Indicator::Macd,
        Indicator::Bollinger,
        Indicator::Trend,
        Indicator::Stochastic,
        Indicator::Cci,
        Indicator::Adx,
        Indicator::Sar,
        Indicator::Ichimoku,
        Indicator::Volume,
        Indicator::Fvg,
        Indicator::Candle,
        Indicator::WilliamsR,
        Indicator::Mfi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Indicator::Rsi => "rsi",
            Indicator::Macd => "macd",
            Indicator::Bollinger => "bollinger",
            Indicator::Trend => "trend",
            Indicator::Stochastic => "stochastic",
            Indicator::Cci => "cci",
            Indicator::Adx => "adx",
            Indicator::Sar => "sar",
            Indicator::Ichimoku => "ichimoku",
            Indicator::Volume => "volume",
            Indicator::Fvg => "fvg",
            Indicator::Candle => "candle",
            Indicator::WilliamsR => "williams_r",
            Indicator::Mfi => "mfi",
        }
    }

    pub fn family(&self) -> IndicatorFamily {
        match self {
            Indicator::Macd | Indicator::Trend | Indicator::Adx | Indicator::Sar | Indicator::Ichimoku => {
                IndicatorFamily::TrendFollowing
            }
            Indicator::Rsi
            | Indicator::Bollinger
            | Indicator::Stochastic
            | Indicator::Cci
            | Indicator::WilliamsR
            | Indicator::Mfi => IndicatorFamily::MeanReversion,
            Indicator::Volume | Indicator::Fvg | Indicator::Candle => IndicatorFamily::Confirmation,
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indicator vote. Deserializes from any number, keeping only its sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "i8")]
pub enum Polarity {
    Bearish,
    #[default]
    Neutral,
    Bullish,
}

impl Polarity {
    pub fn sign(&self) -> i8 {
        match self {
            Polarity::Bearish => -1,
            Polarity::Neutral => 0,
            Polarity::Bullish => 1,
        }
    }

    /// Whether this vote points the same way as a nonzero sign
    pub fn agrees_with(&self, sign: i8) -> bool {
        sign != 0 && self.sign() == sign
    }

    /// Whether this vote points against a nonzero sign
    pub fn opposes(&self, sign: i8) -> bool {
        sign != 0 && self.sign() == -sign
    }
}

impl From<f64> for Polarity {
    fn from(raw: f64) -> Self {
        if raw > 0.0 {
            Polarity::Bullish
        } else if raw < 0.0 {
            Polarity::Bearish
        } else {
            Polarity::Neutral
        }
    }
}

impl From<Polarity> for i8 {
    fn from(p: Polarity) -> Self {
        p.sign()
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    #[default]
    Flat,
}

impl Direction {
    pub fn sign(&self) -> i8 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
            Direction::Flat => 0,
        }
    }

    pub fn from_sign(sign: f64) -> Self {
        if sign > 0.0 {
            Direction::Long
        } else if sign < 0.0 {
            Direction::Short
        } else {
            Direction::Flat
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
            Direction::Flat => write!(f, "FLAT"),
        }
    }
}

/// Asset class of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Forex,
    Commodity,
    Index,
    Stock,
    Crypto,
}

/// Per-symbol indicator votes plus news and sentiment context for one cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalVector {
    /// Indicator votes; missing indicators count as neutral
    pub polarities: BTreeMap<Indicator, Polarity>,
    /// Aggregate news sentiment in [-1, 1]
    pub sentiment: f64,
    /// Number of news items behind the sentiment
    pub news_count: u32,
    /// Confidence reported by the language-model sentiment source
    pub llm_confidence: Option<f64>,
    /// Direction forced by the news-impact predictor, if any
    pub forced_direction: Option<Direction>,
}

impl SignalVector {
    /// Vote for an indicator, neutral when absent
    pub fn polarity(&self, indicator: Indicator) -> Polarity {
        self.polarities.get(&indicator).copied().unwrap_or_default()
    }

    /// Replace out-of-range or non-finite values with neutral ones
    pub fn sanitized(mut self) -> Self {
        self.sentiment = if self.sentiment.is_finite() {
            self.sentiment.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        self.llm_confidence = self
            .llm_confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0));
        if self.forced_direction == Some(Direction::Flat) {
            self.forced_direction = None;
        }
        self
    }

    /// Number of indicators whose vote matches a nonzero sign
    pub fn agreeing_votes(&self, sign: i8) -> usize {
        self.polarities.values().filter(|p| p.agrees_with(sign)).count()
    }

    /// Share of recorded indicators that agree with a direction
    pub fn agreement_with(&self, direction: Direction) -> f64 {
        if self.polarities.is_empty() {
            return 0.0;
        }
        self.agreeing_votes(direction.sign()) as f64 / self.polarities.len() as f64
    }
}

/// Price levels and volatility for a symbol at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSnapshot {
    pub price: f64,
    /// 0 when unknown
    pub support: f64,
    /// 0 when unknown
    pub resistance: f64,
    pub pivot: f64,
    /// Nearest round-number level, 0 when unknown
    pub psych_level: f64,
    /// Standard deviation of hourly returns
    pub volatility_hourly: f64,
    /// Average true range as a fraction of price
    pub atr_pct: f64,
    /// Trend strength (ADX reading)
    pub adx: f64,
}

pub const DEFAULT_VOLATILITY_HOURLY: f64 = 0.01;
pub const DEFAULT_ATR_PCT: f64 = 0.005;
pub const DEFAULT_ADX: f64 = 25.0;

impl Default for MarketSnapshot {
    fn default() -> Self {
        Self {
            price: 0.0,
            support: 0.0,
            resistance: 0.0,
            pivot: 0.0,
            psych_level: 0.0,
            volatility_hourly: DEFAULT_VOLATILITY_HOURLY,
            atr_pct: DEFAULT_ATR_PCT,
            adx: DEFAULT_ADX,
        }
    }
}

impl MarketSnapshot {
    /// Replace missing or malformed fields with neutral defaults
    pub fn sanitized(self) -> Self {
        fn level(v: f64) -> f64 {
            if v.is_finite() && v > 0.0 { v } else { 0.0 }
        }
        fn positive_or(v: f64, fallback: f64) -> f64 {
            if v.is_finite() && v > 0.0 { v } else { fallback }
        }
        Self {
            price: level(self.price),
            support: level(self.support),
            resistance: level(self.resistance),
            pivot: level(self.pivot),
            psych_level: level(self.psych_level),
            volatility_hourly: positive_or(self.volatility_hourly, DEFAULT_VOLATILITY_HOURLY),
            atr_pct: positive_or(self.atr_pct, DEFAULT_ATR_PCT),
            adx: if self.adx.is_finite() && self.adx >= 0.0 { self.adx } else { DEFAULT_ADX },
        }
    }
}

/// Market regime classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Trending,
    Ranging,
    Volatile,
    #[default]
    Neutral,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Trending => "trending",
            Regime::Ranging => "ranging",
            Regime::Volatile => "volatile",
            Regime::Neutral => "neutral",
        }
    }
}

/// Regime label with confidence and the raw readings behind it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeReading {
    pub regime: Regime,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub trend_strength: f64,
    pub trend_agreement: f64,
    pub volatility_percentile: f64,
}

impl Default for RegimeReading {
    fn default() -> Self {
        Self {
            regime: Regime::Neutral,
            confidence: 0.5,
            trend_strength: DEFAULT_ADX,
            trend_agreement: 0.0,
            volatility_percentile: 0.5,
        }
    }
}

/// Forex trading session, used to scale sentiment-driven returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSession {
    Asia,
    London,
    NewYork,
    OffHours,
    Weekend,
}

impl MarketSession {
    /// Session active at a UTC instant
    pub fn at(time: DateTime<Utc>) -> Self {
        if matches!(time.weekday(), Weekday::Sat | Weekday::Sun) {
            return MarketSession::Weekend;
        }
        let hour = time.hour() as f64 + time.minute() as f64 / 60.0;
        if hour < 8.0 {
            MarketSession::Asia
        } else if hour < 16.0 {
            MarketSession::London
        } else if (13.5..20.0).contains(&hour) {
            MarketSession::NewYork
        } else {
            MarketSession::OffHours
        }
    }
}

/// External win-probability estimate for a candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WinEstimate {
    /// Raw win probability
    pub probability: f64,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
}

/// One symbol's inputs for a decision cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub asset_class: AssetClass,
    #[serde(default)]
    pub signals: SignalVector,
    #[serde(default)]
    pub snapshot: MarketSnapshot,
    #[serde(default)]
    pub win_estimate: Option<WinEstimate>,
}

/// Fully sized trade recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub direction: Direction,
    /// Signed expected return
    pub expected_return_pct: f64,
    pub expected_profit_pct: f64,
    pub stop_pct: f64,
    /// Reward-to-risk ratio
    pub rr: f64,
    pub leverage: u32,
    /// Fraction of capital
    pub size_fraction: f64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub regime: RegimeReading,
    /// Win probability used for sizing
    pub win_probability: f64,
    pub news_count: u32,
    /// Size was reduced by the correlation limiter
    pub correlation_limited: bool,
}

impl TradePlan {
    /// Daily-budget risk consumed by this plan
    pub fn risk(&self) -> f64 {
        self.stop_pct * self.leverage as f64
    }
}

/// Position lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Win,
    Loss,
}

/// An admitted trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub asset_class: AssetClass,
    pub direction: Direction,
    pub size_fraction: f64,
    pub leverage: u32,
    pub stop_pct: f64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub entry_time: DateTime<Utc>,
    pub status: PositionStatus,
    /// Signals at entry, kept for attribution and indicator tallies
    pub entry_signals: SignalVector,
    pub entry_volatility: f64,
    pub entry_atr_pct: f64,
    pub regime: Regime,
    pub correlation_limited: bool,
}

impl Position {
    /// Open a position from an admitted plan
    pub fn from_plan(plan: &TradePlan, signals: SignalVector, snapshot: &MarketSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            id: crate::utils::helpers::generate_id(),
            symbol: plan.symbol.clone(),
            asset_class: plan.asset_class,
            direction: plan.direction,
            size_fraction: plan.size_fraction,
            leverage: plan.leverage,
            stop_pct: plan.stop_pct,
            entry_price: plan.entry_price,
            stop_price: plan.stop_price,
            target_price: plan.target_price,
            entry_time: now,
            status: PositionStatus::Open,
            entry_signals: signals,
            entry_volatility: snapshot.volatility_hourly,
            entry_atr_pct: snapshot.atr_pct,
            regime: plan.regime.regime,
            correlation_limited: plan.correlation_limited,
        }
    }

    /// Direction-adjusted return at a price, unlevered
    pub fn return_at(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * self.direction.sign() as f64
    }
}

/// Cause assigned to a closed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureType {
    Logic,
    News,
    Mixed,
    None,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::Logic => "logic",
            FailureType::News => "news",
            FailureType::Mixed => "mixed",
            FailureType::None => "none",
        }
    }
}

/// Closed position with outcome and attribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub position: Position,
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_volatility: f64,
    pub exit_atr_pct: f64,
    /// Direction-adjusted unlevered return
    pub return_pct: f64,
    pub hold_hours: f64,
    pub failure_type: FailureType,
    pub attribution_reasons: Vec<String>,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.position.status == PositionStatus::Win
    }

    /// Whether the record may feed learning and indicator tallies
    pub fn is_attributable(&self) -> bool {
        self.failure_type != FailureType::News
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_polarity_keeps_sign_only() {
        let v: SignalVector = serde_json::from_str(
            r#"{"polarities": {"rsi": 3, "macd": -0.2, "trend": 0}, "sentiment": 4.0}"#,
        )
        .unwrap();
        assert_eq!(v.polarity(Indicator::Rsi), Polarity::Bullish);
        assert_eq!(v.polarity(Indicator::Macd), Polarity::Bearish);
        assert_eq!(v.polarity(Indicator::Trend), Polarity::Neutral);
        assert_eq!(v.polarity(Indicator::Mfi), Polarity::Neutral);
        assert_eq!(v.sanitized().sentiment, 1.0);
    }

    #[test]
    fn test_snapshot_sanitized_defaults() {
        let snap = MarketSnapshot {
            price: 1.1,
            volatility_hourly: f64::NAN,
            atr_pct: -1.0,
            adx: f64::INFINITY,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(snap.volatility_hourly, DEFAULT_VOLATILITY_HOURLY);
        assert_eq!(snap.atr_pct, DEFAULT_ATR_PCT);
        assert_eq!(snap.adx, DEFAULT_ADX);
    }

    #[test]
    fn test_market_session() {
        let monday_london = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        let monday_ny = Utc.with_ymd_and_hms(2026, 10, 19, 17, 0, 0).unwrap();
        let saturday = Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap();
        assert_eq!(MarketSession::at(monday_london), MarketSession::London);
        assert_eq!(MarketSession::at(monday_ny), MarketSession::NewYork);
        assert_eq!(MarketSession::at(saturday), MarketSession::Weekend);
    }

    #[test]
    fn test_agreement_with_direction() {
        let mut v = SignalVector::default();
        v.polarities.insert(Indicator::Rsi, Polarity::Bullish);
        v.polarities.insert(Indicator::Macd, Polarity::Bullish);
        v.polarities.insert(Indicator::Sar, Polarity::Bearish);
        v.polarities.insert(Indicator::Cci, Polarity::Neutral);
        assert!((v.agreement_with(Direction::Long) - 0.5).abs() < 1e-12);
        assert!((v.agreement_with(Direction::Short) - 0.25).abs() < 1e-12);
    }
}
