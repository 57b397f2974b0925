use serde::Serialize;

// Two-line block: `title` over `<measure>: <value>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TooltipContent {
    pub title: String,
    pub measure: String,
    pub value: String,
}

impl TooltipContent {
    pub fn for_region(title: &str, measure: &str, value: Option<f64>) -> Self {
        let value = value.filter(|v| v.is_finite()).map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string());
        Self { title: title.to_string(), measure: measure.to_string(), value }
    }

    pub fn body(&self) -> String {
        format!("{}: {}", self.measure, self.value)
    }
}

pub trait TooltipSurface {
    fn show(&mut self, left: f64, top: f64, content: TooltipContent);
    fn hide(&mut self);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TooltipState {
    pub visible: bool,
    pub left: f64,
    pub top: f64,
    pub content: Option<TooltipContent>,
}

impl TooltipSurface for TooltipState {
    fn show(&mut self, left: f64, top: f64, content: TooltipContent) {
        self.visible = true;
        self.left = left;
        self.top = top;
        self.content = Some(content);
    }

    fn hide(&mut self) {
        self.visible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_read_as_not_available() {
        let content = TooltipContent::for_region("Autauga County", "poverty", None);
        assert_eq!(content.body(), "poverty: N/A");
        let content = TooltipContent::for_region("Autauga County", "poverty", Some(18.5));
        assert_eq!(content.body(), "poverty: 18.5");
    }

    #[test]
    fn measure_and_value_stay_separate() {
        let content = TooltipContent::for_region("Autauga County", "a: b", Some(3.0));
        assert_eq!(content.measure, "a: b");
        assert_eq!(content.value, "3");
        assert_eq!(content.body(), "a: b: 3");

        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["measure"], "a: b");
        assert_eq!(json["value"], "3");
    }

    #[test]
    fn hide_keeps_last_position() {
        let mut state = TooltipState::default();
        state.show(15.0, 25.0, TooltipContent::for_region("x", "m", None));
        assert!(state.visible);
        state.hide();
        assert!(!state.visible);
        assert_eq!((state.left, state.top), (15.0, 25.0));
    }
}
