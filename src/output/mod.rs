pub mod csv;
pub mod table;

use anyhow::Result;
use serde::Serialize;

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn percent(value: f64) -> String {
    format!("{value:.2}%")
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}
