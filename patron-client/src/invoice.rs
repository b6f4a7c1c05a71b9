//! Invoice export
//!
//! Renders one order and its lines as a standalone HTML document. Pure
//! function of already-loaded data.

use shared::models::Order;
use std::fmt::Write;

use crate::config::{RestaurantConfig, group_thousands};

/// Order line joined with the menu item name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceLine {
    pub name: String,
    pub quantity: u32,
    pub unit_price: u64,
}

impl InvoiceLine {
    pub fn line_total(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }
}

/// Downloadable invoice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDocument {
    pub file_name: String,
    pub html: String,
}

/// Escape text for HTML content and attribute values
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// (date, time) of the order in `dd/mm/yyyy`, `HH:MM:SS`
fn order_date_time(order: &Order) -> (String, String) {
    order
        .created_at
        .as_deref()
        .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| {
            (
                dt.format("%d/%m/%Y").to_string(),
                dt.format("%H:%M:%S").to_string(),
            )
        })
        .unwrap_or_else(|| ("-".to_string(), "-".to_string()))
}

fn file_name(order: &Order, restaurant: &RestaurantConfig) -> String {
    let id8: String = order.id.chars().take(8).collect();
    let name: String = restaurant
        .name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '-' } else { c })
        .collect();
    format!("Invoice-{}-{}.html", id8, name)
}

pub fn render(order: &Order, lines: &[InvoiceLine], restaurant: &RestaurantConfig) -> InvoiceDocument {
    let theme = &restaurant.theme;
    let name = escape_html(&restaurant.name);
    let invoice_no = escape_html(&order.short_ref());
    let (date, time) = order_date_time(order);

    let mut rows = String::new();
    for line in lines {
        // writing into a String cannot fail
        let _ = write!(
            rows,
            r#"
        <tr>
          <td>{}</td>
          <td class="qty">{}</td>
          <td class="num">{}</td>
          <td class="num strong">{}</td>
        </tr>"#,
            escape_html(&line.name),
            line.quantity,
            group_thousands(line.unit_price),
            group_thousands(line.line_total()),
        );
    }

    let logo = restaurant
        .logo_url
        .as_deref()
        .map(|url| format!(r#"<img src="{}" class="logo" alt="" />"#, escape_html(url)))
        .unwrap_or_default();

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="UTF-8">
  <title>Invoice {invoice_no}</title>
  <style>
    body {{ font-family: Arial, sans-serif; max-width: 800px; margin: 40px auto; padding: 20px; background: #f9fafb; }}
    .invoice {{ background: white; padding: 40px; border-radius: 15px; }}
    .header {{ text-align: center; margin-bottom: 30px; padding-bottom: 20px; border-bottom: 3px solid {primary}; }}
    .logo {{ width: 80px; height: 80px; border-radius: 50%; }}
    h1 {{ color: {primary}; margin: 10px 0; }}
    .info {{ display: grid; grid-template-columns: 1fr 1fr; gap: 15px; margin: 30px 0; }}
    .info-box {{ background: {primary_bg}; padding: 15px; border-radius: 10px; }}
    .label {{ font-size: 12px; color: {text_secondary}; }}
    .value {{ font-weight: bold; color: {primary}; }}
    table {{ width: 100%; border-collapse: collapse; }}
    th {{ background: {primary}; color: white; padding: 12px; text-align: left; }}
    td {{ padding: 12px; border-bottom: 1px solid #e5e7eb; }}
    .qty {{ text-align: center; }}
    .num {{ text-align: right; }}
    .strong {{ font-weight: bold; }}
    .total td {{ background: {primary_bg}; color: {primary}; font-size: 20px; font-weight: bold; text-align: right; }}
    .footer {{ text-align: center; margin-top: 30px; border-top: 2px solid {primary}; color: {primary}; font-weight: bold; }}
  </style>
</head>
<body>
  <div class="invoice">
    <div class="header">
      {logo}
      <h1>{name}</h1>
      <p>{slogan}</p>
      <h2>INVOICE No. {invoice_no}</h2>
    </div>
    <div class="info">
      <div class="info-box"><div class="label">Date</div><div class="value">{date}</div></div>
      <div class="info-box"><div class="label">Time</div><div class="value">{time}</div></div>
      <div class="info-box"><div class="label">Table</div><div class="value">Table {table}</div></div>
      <div class="info-box"><div class="label">Status</div><div class="value">{status}</div></div>
    </div>
    <table>
      <thead><tr><th>Item</th><th class="qty">Qty</th><th class="num">Unit price</th><th class="num">Total</th></tr></thead>
      <tbody>{rows}
      </tbody>
      <tfoot>
        <tr class="total"><td colspan="3">TOTAL DUE</td><td>{total}</td></tr>
      </tfoot>
    </table>
    <div class="footer">
      <p>Thank you for your visit!</p>
      <p>See you soon at {name}</p>
    </div>
  </div>
</body>
</html>
"#,
        primary = escape_html(&theme.primary),
        primary_bg = escape_html(&theme.primary_bg),
        text_secondary = escape_html(&theme.text_secondary),
        slogan = escape_html(&restaurant.slogan),
        table = order.table_number,
        status = order.status,
        total = escape_html(&restaurant.format_amount(order.total_amount)),
    );

    InvoiceDocument {
        file_name: file_name(order, restaurant),
        html,
    }
}
