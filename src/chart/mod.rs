// SVG candlestick chart with a volume pane and resting-order overlays

use crate::models::{Candle, OpenOrder, Side};
use crate::persistence::write_atomic;
use crate::Result;
use chrono::{TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt::Write;
use std::path::Path;

const WIDTH: f64 = 1200.0;
const HEIGHT: f64 = 800.0;
const LEFT: f64 = 80.0;
const RIGHT: f64 = 20.0;
const PRICE_TOP: f64 = 50.0;
const PRICE_BOTTOM: f64 = 570.0;
const VOLUME_TOP: f64 = 610.0;
const VOLUME_BOTTOM: f64 = 750.0;

/// One price tick of padding above the highest high and below the lowest low
const TICK: Decimal = dec!(0.0001);

const BACKGROUND: &str = "#1c2526";
const PANE: &str = "#2a2e39";
const UP: &str = "green";
const DOWN: &str = "red";

/// Render the chart, or None with fewer than two candles
pub fn render_svg(symbol: &str, candles: &[Candle], orders: &[OpenOrder]) -> Option<String> {
    if candles.len() < 2 {
        return None;
    }

    let low = candles.iter().map(|c| c.low).min()? - TICK;
    let high = candles.iter().map(|c| c.high).max()? + TICK;
    let price_min = to_f64(low);
    let price_span = to_f64(high - low);
    let max_volume = candles.iter().map(|c| to_f64(c.volume)).fold(0.0, f64::max);

    let plot_width = WIDTH - LEFT - RIGHT;
    let step = plot_width / candles.len() as f64;
    let body_width = (step * 0.6).max(1.0);

    let y_price = |p: Decimal| PRICE_TOP + (1.0 - (to_f64(p) - price_min) / price_span) * (PRICE_BOTTOM - PRICE_TOP);
    let x_center = |i: usize| LEFT + step * (i as f64 + 0.5);

    let mut svg = String::new();
    // Writing into a String cannot fail
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="{BACKGROUND}"/>"#);
    let _ = writeln!(
        svg,
        r#"<rect x="{LEFT}" y="{PRICE_TOP}" width="{plot_width}" height="{}" fill="{PANE}"/>"#,
        PRICE_BOTTOM - PRICE_TOP
    );
    let _ = writeln!(
        svg,
        r#"<rect x="{LEFT}" y="{VOLUME_TOP}" width="{plot_width}" height="{}" fill="{PANE}"/>"#,
        VOLUME_BOTTOM - VOLUME_TOP
    );
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="30" fill="white" font-size="18" text-anchor="middle">OHLC Candlestick Chart for {}</text>"#,
        WIDTH / 2.0,
        escape(symbol)
    );

    // Price grid
    for i in 0..=4 {
        let price = low + (high - low) * Decimal::from(i) / Decimal::from(4);
        let y = y_price(price);
        let _ = writeln!(
            svg,
            r#"<line x1="{LEFT}" y1="{y:.2}" x2="{}" y2="{y:.2}" stroke="white" stroke-opacity="0.3" stroke-dasharray="4 4"/>"#,
            WIDTH - RIGHT
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{:.2}" fill="white" font-size="12" text-anchor="end">{}</text>"#,
            LEFT - 6.0,
            y + 4.0,
            price.round_dp(4)
        );
    }
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" fill="white" font-size="12" text-anchor="end">Volume</text>"#,
        LEFT - 6.0,
        VOLUME_TOP + 12.0
    );

    for (i, candle) in candles.iter().enumerate() {
        let x = x_center(i);
        let color = if candle.is_bullish() { UP } else { DOWN };

        // Wick
        let _ = writeln!(
            svg,
            r#"<line x1="{x:.2}" y1="{:.2}" x2="{x:.2}" y2="{:.2}" stroke="{color}" stroke-width="1"/>"#,
            y_price(candle.high),
            y_price(candle.low)
        );

        // Body, at least one pixel tall for doji candles
        let top = y_price(candle.open.max(candle.close));
        let bottom = y_price(candle.open.min(candle.close));
        let _ = writeln!(
            svg,
            r#"<rect x="{:.2}" y="{top:.2}" width="{body_width:.2}" height="{:.2}" fill="{color}"/>"#,
            x - body_width / 2.0,
            (bottom - top).max(1.0)
        );

        if max_volume > 0.0 {
            let bar = to_f64(candle.volume) / max_volume * (VOLUME_BOTTOM - VOLUME_TOP);
            let _ = writeln!(
                svg,
                r#"<rect x="{:.2}" y="{:.2}" width="{body_width:.2}" height="{bar:.2}" fill="gray" fill-opacity="0.5"/>"#,
                x - body_width / 2.0,
                VOLUME_BOTTOM - bar
            );
        }

        if i % 5 == 0 {
            if let Some(label) = Utc.timestamp_millis_opt(candle.open_time).single() {
                let _ = writeln!(
                    svg,
                    r#"<text x="{x:.2}" y="{}" fill="white" font-size="11" text-anchor="middle">{}</text>"#,
                    VOLUME_BOTTOM + 18.0,
                    label.format("%H:%M")
                );
            }
        }
    }

    for order in orders {
        if order.price < low || order.price > high {
            continue;
        }
        let color = match order.side {
            Side::Buy => UP,
            Side::Sell => DOWN,
        };
        let y = y_price(order.price);
        let _ = writeln!(
            svg,
            r#"<line x1="{LEFT}" y1="{y:.2}" x2="{}" y2="{y:.2}" stroke="{color}" stroke-width="4" stroke-opacity="0.7" stroke-dasharray="12 6"/>"#,
            WIDTH - RIGHT
        );
    }

    svg.push_str("</svg>\n");
    Some(svg)
}

/// Render and write the chart; returns false when there was too little data
pub fn write_chart(path: &Path, symbol: &str, candles: &[Candle], orders: &[OpenOrder]) -> Result<bool> {
    let Some(svg) = render_svg(symbol, candles, orders) else {
        tracing::error!("Insufficient kline data points: {}", candles.len());
        return Ok(false);
    };

    write_atomic(path, svg.as_bytes())?;
    tracing::info!("Chart saved: {}", path.display());
    Ok(true)
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
