//! Overlay styling policy

use super::OverlaySlot;
use crate::session::ViewMode;
use scai_common::geo::FeatureProperties;
use scai_common::CongestionLevel;
use serde::Serialize;

/// Line style for one rendered feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayerStyle {
    pub color: &'static str,
    pub weight: f64,
    pub opacity: f64,
    /// Dash pattern, e.g. "6 4"
    pub dash: Option<&'static str>,
}

/// Style function applied to every feature of a slot
pub type StyleFn = fn(&FeatureProperties, ViewMode) -> LayerStyle;

const BASELINE_OPACITY: f64 = 0.75;
/// Baseline fades so the modified overlay stands out in the after view
const BASELINE_OPACITY_AFTER: f64 = 0.3;

const CLOSED_STYLE: LayerStyle = LayerStyle {
    color: "#7f1d1d",
    weight: 5.0,
    opacity: 0.95,
    dash: Some("6 4"),
};

fn congestion_color(level: CongestionLevel) -> &'static str {
    match level {
        CongestionLevel::Free => "#22c55e",
        CongestionLevel::Moderate => "#eab308",
        CongestionLevel::Heavy => "#f97316",
        CongestionLevel::Severe => "#ef4444",
        CongestionLevel::Closed => CLOSED_STYLE.color,
    }
}

fn congestion_weight(level: CongestionLevel) -> f64 {
    match level {
        CongestionLevel::Free => 1.5,
        CongestionLevel::Moderate => 2.0,
        CongestionLevel::Heavy => 2.5,
        CongestionLevel::Severe | CongestionLevel::Closed => 3.0,
    }
}

fn baseline_style(props: &FeatureProperties, view_mode: ViewMode) -> LayerStyle {
    let level = props.level();
    LayerStyle {
        color: congestion_color(level),
        weight: congestion_weight(level),
        opacity: match view_mode {
            ViewMode::Before => BASELINE_OPACITY,
            ViewMode::After => BASELINE_OPACITY_AFTER,
        },
        dash: None,
    }
}

fn modified_style(props: &FeatureProperties, _view_mode: ViewMode) -> LayerStyle {
    if props.is_closed {
        return CLOSED_STYLE;
    }
    LayerStyle {
        color: congestion_color(props.level()),
        weight: 4.0,
        opacity: 0.9,
        dash: None,
    }
}

/// Style function for a slot
pub fn style_for(slot: OverlaySlot) -> StyleFn {
    match slot {
        OverlaySlot::Baseline => baseline_style,
        OverlaySlot::Modified => modified_style,
    }
}

/// Hover/popup label: name, congestion or closure, and the policy marker
pub fn feature_label(props: &FeatureProperties) -> String {
    let mut parts = Vec::with_capacity(3);

    let name = props.display_name();
    match props.category() {
        Some(category) if category != name => parts.push(format!("{} ({})", name, category)),
        _ => parts.push(name.to_string()),
    }

    if props.is_closed {
        parts.push("Closed".to_string());
    } else if let Some(pct) = props.congestion_pct() {
        parts.push(format!("{}% congestion", pct));
    }

    if props.is_modified {
        parts.push("Modified by policy".to_string());
    }

    parts.join(" | ")
}
