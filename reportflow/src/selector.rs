use serde::Serialize;

/// Represents ways to locate an element in a page or frame document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Selector {
    /// Plain CSS selector
    Css(String),
    /// Innermost element whose text content contains the given text
    Text(String),
    /// Elements matching a CSS selector whose text content contains the given text
    /// (Playwright-style `:has-text()`)
    HasText { css: String, text: String },
    /// Select the n-th element from the current matches (negative counts from the end)
    Nth(i32),
    /// Chain multiple selectors, each part scoped to the matches of the previous one
    Chain(Vec<Selector>),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl Selector {
    /// Scope `next` to the matches of this selector.
    pub fn then(self, next: impl Into<Selector>) -> Selector {
        let mut chain = match self {
            Selector::Chain(parts) => parts,
            s => vec![s],
        };
        match next.into() {
            Selector::Chain(mut parts) => chain.append(&mut parts),
            s => chain.push(s),
        }
        Selector::Chain(chain)
    }

    /// First match of this selector.
    pub fn first(self) -> Selector {
        self.then(Selector::Nth(0))
    }

    pub fn validate(&self) -> Result<(), crate::AutomationError> {
        match self {
            Selector::Invalid(reason) => {
                Err(crate::AutomationError::InvalidSelector(reason.clone()))
            }
            Selector::Chain(parts) if parts.is_empty() => Err(
                crate::AutomationError::InvalidSelector("empty selector chain".to_string()),
            ),
            Selector::Chain(parts) => parts.iter().try_for_each(Selector::validate),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Css(css) => write!(f, "{css}"),
            Selector::Text(text) => write!(f, "text={text}"),
            Selector::HasText { css, text } => write!(f, "{css}:has-text(\"{text}\")"),
            Selector::Nth(n) => write!(f, "nth={n}"),
            Selector::Chain(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", rendered.join(" >> "))
            }
            Selector::Invalid(reason) => write!(f, "<invalid: {reason}>"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // Handle chained selectors first
        let parts: Vec<&str> = s.split(">>").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            return Selector::Chain(parts.into_iter().map(Selector::from).collect());
        }

        if s.is_empty() {
            return Selector::Invalid("empty selector".to_string());
        }

        let lower = s.to_lowercase();
        match s {
            _ if lower.starts_with("text=") || lower.starts_with("text:") => {
                let text = unquote(s[5..].trim());
                if text.is_empty() {
                    Selector::Invalid(format!("Empty text selector: '{s}'"))
                } else {
                    Selector::Text(text.to_string())
                }
            }
            _ if lower.starts_with("nth=") || lower.starts_with("nth:") => {
                let index_str = s[4..].trim();
                match index_str.parse::<i32>() {
                    Ok(index) => Selector::Nth(index),
                    Err(_) => {
                        Selector::Invalid(format!("Invalid index for nth selector: '{index_str}'"))
                    }
                }
            }
            _ if s.contains(":has-text(") => parse_has_text(s),
            _ if lower.starts_with("css=") => Selector::Css(s[4..].trim().to_string()),
            _ => Selector::Css(s.to_string()),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

impl From<&Selector> for Selector {
    fn from(s: &Selector) -> Self {
        s.clone()
    }
}

fn parse_has_text(s: &str) -> Selector {
    let Some(start) = s.find(":has-text(") else {
        return Selector::Invalid(format!("Missing :has-text() in '{s}'"));
    };
    let css = s[..start].trim();
    let rest = &s[start + ":has-text(".len()..];
    let Some(end) = rest.rfind(')') else {
        return Selector::Invalid(format!("Unterminated :has-text() in '{s}'"));
    };
    if !rest[end + 1..].trim().is_empty() {
        return Selector::Invalid(format!(
            "Trailing input after :has-text() in '{s}'; use '>>' to scope further"
        ));
    }
    let text = unquote(rest[..end].trim());
    if text.is_empty() {
        return Selector::Invalid(format!("Empty :has-text() in '{s}'"));
    }
    Selector::HasText {
        css: if css.is_empty() { "*".to_string() } else { css.to_string() },
        text: text.to_string(),
    }
}

fn unquote(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_css() {
        assert_eq!(
            Selector::from("p-multiselect[formcontrolname=\"vendors\"]"),
            Selector::Css("p-multiselect[formcontrolname=\"vendors\"]".to_string())
        );
    }

    #[test]
    fn test_text_selector() {
        assert_eq!(Selector::from("text=Reports"), Selector::Text("Reports".to_string()));
        assert_eq!(
            Selector::from("text=\"PO-GRN Docs Report\""),
            Selector::Text("PO-GRN Docs Report".to_string())
        );
    }

    #[test]
    fn test_has_text_selector() {
        assert_eq!(
            Selector::from("button:has-text(\"LOG IN\")"),
            Selector::HasText {
                css: "button".to_string(),
                text: "LOG IN".to_string()
            }
        );
        assert_eq!(
            Selector::from("button.md-raised.md-primary:has-text('Show Report')"),
            Selector::HasText {
                css: "button.md-raised.md-primary".to_string(),
                text: "Show Report".to_string()
            }
        );
    }

    #[test]
    fn test_has_text_with_trailing_input_is_invalid() {
        assert!(matches!(
            Selector::from("button:has-text(\"Go\") span"),
            Selector::Invalid(_)
        ));
    }

    #[test]
    fn test_chain_with_nth() {
        let selector = Selector::from(
            "tbody.p-datatable-tbody tr >> nth=0 >> span.p-button-label:has-text(\"Download\")",
        );
        assert_eq!(
            selector,
            Selector::Chain(vec![
                Selector::Css("tbody.p-datatable-tbody tr".to_string()),
                Selector::Nth(0),
                Selector::HasText {
                    css: "span.p-button-label".to_string(),
                    text: "Download".to_string()
                },
            ])
        );
    }

    #[test]
    fn test_first_builds_chain() {
        let selector = Selector::from("div.p-checkbox-box").first();
        assert_eq!(
            selector,
            Selector::Chain(vec![Selector::Css("div.p-checkbox-box".to_string()), Selector::Nth(0)])
        );
        assert_eq!(selector.to_string(), "div.p-checkbox-box >> nth=0");
    }

    #[test]
    fn test_display_round_trips_through_parser() {
        let original = "tbody tr >> nth=-1 >> text=Download";
        assert_eq!(Selector::from(original).to_string(), original);
    }

    #[test]
    fn test_invalid_selectors_fail_validation() {
        assert!(Selector::from("nth=abc").validate().is_err());
        assert!(Selector::from("").validate().is_err());
        assert!(Selector::from("a >> text=").validate().is_err());
        assert!(Selector::from("input#sendMail").validate().is_ok());
    }
}
