//! Terminal render target.

#![allow(clippy::print_stdout)]

use std::sync::atomic::{AtomicBool, Ordering};

use basket_client::render::{CartRenderer, RenderedLine};
use basket_core::{CartSnapshot, VariantId, WishlistSet, format_amount};

/// Prints cart changes as they happen.
///
/// Silent until [`TerminalRenderer::go_live`] so the initial fetch of a
/// command does not echo the whole cart.
#[derive(Debug, Default)]
pub struct TerminalRenderer {
    live: AtomicBool,
}

impl TerminalRenderer {
    /// Start printing changes.
    pub fn go_live(&self) {
        self.live.store(true, Ordering::Relaxed);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }
}

/// One table row for a cart line.
pub fn format_line(line: &RenderedLine) -> String {
    let title = if line.display.title.is_empty() {
        line.product_id.as_str()
    } else {
        line.display.title.as_str()
    };
    let variant = line
        .display
        .variant_title
        .as_deref()
        .map(|v| format!(" ({v})"))
        .unwrap_or_default();
    format!(
        "{:<16} {title}{variant}  x{}  @ {}  = {}",
        line.variant_id.as_str(),
        line.quantity,
        format_amount(line.unit_price),
        format_amount(line.line_total),
    )
}

/// Print the whole cart with its subtotal.
pub fn print_cart(lines: &[RenderedLine], snapshot: &CartSnapshot) {
    if lines.is_empty() {
        println!("Cart is empty");
        return;
    }
    for line in lines {
        println!("{}", format_line(line));
    }
    let tier = if snapshot.wholesale_active() {
        "wholesale"
    } else {
        "retail"
    };
    println!(
        "{} item(s), subtotal {} ({tier})",
        snapshot.total_quantity(),
        format_amount(snapshot.subtotal())
    );
}

/// Print one product id per line.
pub fn print_wishlist(wishlist: &WishlistSet) {
    if wishlist.is_empty() {
        println!("Wishlist is empty");
    }
    for product_id in wishlist.iter() {
        println!("{product_id}");
    }
}

impl CartRenderer for TerminalRenderer {
    fn render(&self, added: &[RenderedLine]) {
        if self.is_live() {
            for line in added {
                println!("+ {}", format_line(line));
            }
        }
    }

    fn remove(&self, removed: &[VariantId]) {
        if self.is_live() {
            for variant_id in removed {
                println!("- {variant_id}");
            }
        }
    }

    fn update(&self, updated: &[RenderedLine]) {
        if self.is_live() {
            for line in updated {
                println!("~ {}", format_line(line));
            }
        }
    }

    fn set_pending_removal(&self, variant_id: &VariantId, pending: bool) {
        if self.is_live() && pending {
            println!("… removing {variant_id}");
        }
    }

    fn set_wholesale(&self, active: bool) {
        if self.is_live() {
            if active {
                println!("Wholesale pricing applied");
            } else {
                println!("Retail pricing applied");
            }
        }
    }
}
