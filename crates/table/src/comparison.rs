//! Category price comparison view and rule-based pricing insights.

use menuscope_features::ColorAllocator;
use menuscope_model::{CategoryComparison, ComparisonItem};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Gap (in percent) beyond which a category counts as under/over priced.
const SIGNIFICANT_GAP: f64 = 10.0;

/// Gap (in percent) within which a category counts as aligned.
const ALIGNED_GAP: f64 = 5.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingInsights {
    pub insights: Vec<String>,
    pub summary: String,
}

fn money(value: Option<f64>) -> String {
    value
        .map(|v| format!("${v:.2}"))
        .unwrap_or_else(|| "-".to_string())
}

/// Render comparison rows with a stable series colour per canonical category.
pub fn render_comparison(comparison: &CategoryComparison, colors: &mut ColorAllocator) -> String {
    let mut out = String::new();

    if comparison.comparisons.is_empty() {
        out.push_str("No comparison data. Map menu categories to compare prices.\n");
    } else {
        let _ = writeln!(
            out,
            "{:<24} {:<8} {:>10} {:>6} {:>10} {:>6} {:>8}",
            "CATEGORY", "COLOR", "YOURS", "ITEMS", "MARKET", "ITEMS", "DELTA"
        );
        for item in &comparison.comparisons {
            let delta = item
                .delta_pct
                .map(|d| format!("{d:+.1}%"))
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{:<24} {:<8} {:>10} {:>6} {:>10} {:>6} {:>8}",
                item.canonical_category_name,
                colors.color_for(&item.canonical_category_name),
                money(item.operator_avg),
                item.operator_items,
                money(item.market_avg),
                item.market_items,
                delta
            );
        }
    }

    if !comparison.unmapped_operator_categories.is_empty() {
        let _ = writeln!(
            out,
            "Unmapped operator categories: {}",
            comparison.unmapped_operator_categories.join(", ")
        );
    }
    if !comparison.unmapped_competitor_categories.is_empty() {
        let _ = writeln!(
            out,
            "Unmapped competitor categories: {}",
            comparison.unmapped_competitor_categories.join(", ")
        );
    }

    out
}

/// Categories with both an operator and a market average, with their delta.
fn priced(comparison: &CategoryComparison) -> Vec<(&ComparisonItem, f64)> {
    comparison
        .comparisons
        .iter()
        .filter(|c| c.operator_avg.is_some() && c.market_avg.is_some())
        .map(|c| (c, c.delta_pct.unwrap_or(0.0)))
        .collect()
}

/// Rule-based recommendations derived from the comparison.
pub fn pricing_insights(comparison: &CategoryComparison) -> PricingInsights {
    if comparison.comparisons.is_empty() {
        return PricingInsights {
            insights: Vec::new(),
            summary: "No comparison data available. Map your menu categories first.".to_string(),
        };
    }

    let data = priced(comparison);
    if data.is_empty() {
        return PricingInsights {
            insights: Vec::new(),
            summary: "Need more data. Map competitor categories to enable insights.".to_string(),
        };
    }

    let mut insights = Vec::new();

    let mut underpriced: Vec<&(&ComparisonItem, f64)> =
        data.iter().filter(|(_, d)| *d < -SIGNIFICANT_GAP).collect();
    underpriced.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    if let Some((item, delta)) = underpriced.first() {
        insights.push(format!(
            "Your {} prices are {:.0}% below market. Consider a {:.0}% price increase to capture additional margin.",
            item.canonical_category_name,
            delta.abs(),
            delta.abs() * 0.5
        ));
    }

    let overpriced = data
        .iter()
        .filter(|(_, d)| *d > SIGNIFICANT_GAP)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    if let Some((item, delta)) = overpriced {
        insights.push(format!(
            "Your {} prices are {:.0}% above market. Ensure quality justifies the premium or consider promotional pricing.",
            item.canonical_category_name, delta
        ));
    }

    let aligned: Vec<&str> = data
        .iter()
        .filter(|(_, d)| d.abs() <= ALIGNED_GAP)
        .take(2)
        .map(|(item, _)| item.canonical_category_name.as_str())
        .collect();
    if !aligned.is_empty() {
        insights.push(format!(
            "Your {} pricing is well-aligned with the market. Focus differentiation efforts elsewhere.",
            aligned.join(", ")
        ));
    }

    if !underpriced.is_empty() {
        insights.push(format!(
            "{} categories are significantly underpriced. Addressing these could improve margins without losing competitiveness.",
            underpriced.len()
        ));
    }

    let avg_delta = data.iter().map(|(_, d)| d).sum::<f64>() / data.len() as f64;
    let summary = if avg_delta < -SIGNIFICANT_GAP {
        "Overall, your prices are significantly below market. There's room to increase prices and improve margins."
    } else if avg_delta > SIGNIFICANT_GAP {
        "Overall, your prices are above market average. Ensure your value proposition supports premium pricing."
    } else {
        "Your pricing is generally competitive with the market. Focus on optimizing specific categories."
    };

    PricingInsights {
        insights,
        summary: summary.to_string(),
    }
}
