//! Meal period inference.
//!
//! The JSON API names its selected period outright. Pages and rendered
//! Markdown only hint at it, usually with a "Today" marker next to the
//! current period's tab, so text detection works in two tiers: a period
//! mentioned near a "today" marker wins, otherwise the first period mentioned
//! anywhere (breakfast, then lunch) is used, and dinner is the default.

use campusmenu_extract::MenuApiResponse;
use campusmenu_shared::{RawSourceContent, SourceBody};
use tracing::debug;

/// Period assumed when nothing in the content says otherwise.
pub const DEFAULT_MEAL_PERIOD: &str = "dinner";

/// Known periods in priority order.
const PERIODS: [&str; 3] = ["breakfast", "lunch", "dinner"];

/// Non-empty lines after a "today" marker that still count as next to it.
const TODAY_WINDOW: usize = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct MealPeriodDetector;

impl MealPeriodDetector {
    /// Detect the period for any acquired content.
    pub fn detect(&self, content: &RawSourceContent) -> String {
        let period = match &content.body {
            SourceBody::Json(value) => match MenuApiResponse::from_value(value) {
                Ok(response) => self.detect_api(&response),
                Err(_) => DEFAULT_MEAL_PERIOD.to_string(),
            },
            SourceBody::Html(text) | SourceBody::Markdown(text) => self.detect_text(text),
        };
        debug!(%period, format = %content.format(), "meal period detected");
        period
    }

    /// Lowercased name of the API's selected period, or the default.
    pub fn detect_api(&self, response: &MenuApiResponse) -> String {
        response
            .selected_period_name()
            .map(str::to_lowercase)
            .unwrap_or_else(|| DEFAULT_MEAL_PERIOD.to_string())
    }

    /// Infer the period from page text or Markdown.
    pub fn detect_text(&self, text: &str) -> String {
        let lower = text.to_lowercase();
        let lines: Vec<&str> = lower.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

        let windows: Vec<&[&str]> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.contains("today"))
            .map(|(i, _)| &lines[i..(i + 1 + TODAY_WINDOW).min(lines.len())])
            .collect();

        let near_today = PERIODS
            .iter()
            .find(|p| windows.iter().any(|w| w.iter().any(|l| l.contains(*p))));
        if let Some(period) = near_today {
            return period.to_string();
        }

        PERIODS[..2]
            .iter()
            .find(|p| lower.contains(*p))
            .copied()
            .unwrap_or(DEFAULT_MEAL_PERIOD)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detect(text: &str) -> String {
        MealPeriodDetector.detect_text(text)
    }

    #[test]
    fn today_and_lunch_only_is_lunch() {
        assert_eq!(detect("Today\nLunch\n11am - 2pm"), "lunch");
    }

    #[test]
    fn no_markers_is_dinner() {
        assert_eq!(detect("## Grill\n### Salmon\n320 Calories"), "dinner");
        assert_eq!(detect(""), "dinner");
    }

    #[test]
    fn today_marker_beats_plain_mentions() {
        let page = "Breakfast 7-10am\nLunch 11-2pm\nDinner 5-8pm\n\nToday: Dinner";
        assert_eq!(detect(page), "dinner");
    }

    #[test]
    fn priority_order_when_today_is_next_to_several() {
        assert_eq!(detect("TODAY Lunch Breakfast"), "breakfast");
    }

    #[test]
    fn far_from_today_falls_back_to_presence() {
        let page = "Today\nSpecials\nHours\nSoups\nLunch menu";
        assert_eq!(detect(page), "lunch");
    }

    #[test]
    fn html_presence_is_case_insensitive() {
        assert_eq!(detect("<li class=\"tab\">BREAKFAST</li>"), "breakfast");
        assert_eq!(detect("<h1>Lunch Specials</h1>"), "lunch");
    }

    #[test]
    fn api_uses_selected_period_name() {
        let value = json!({
            "SelectedPeriodId": "3",
            "Menu": { "MenuPeriods": [
                { "PeriodId": "1", "Name": "Breakfast" },
                { "PeriodId": "3", "Name": "Late Night" }
            ]}
        });
        let response = MenuApiResponse::from_value(&value).unwrap();
        assert_eq!(MealPeriodDetector.detect_api(&response), "late night");
    }

    #[test]
    fn api_without_selection_is_dinner() {
        let response = MenuApiResponse::from_value(&json!({ "Menu": {} })).unwrap();
        assert_eq!(MealPeriodDetector.detect_api(&response), "dinner");
    }
}
