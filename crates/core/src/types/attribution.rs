//! Attribution labels.
//!
//! A merchant configures an ordered list of "how did you hear about us"
//! choices. Two fallbacks are always present once a list exists, and orders
//! from customers who never answered are attributed to [`DID_NOT_ANSWER`].

/// Labels added to every newly created choice list, in display order.
pub const FALLBACK_CHOICES: [&str; 2] = ["From A Friend", "Other"];

/// Label written back when a first order arrives with no recorded selection.
pub const DID_NOT_ANSWER: &str = "Did not answer";

/// Longest label accepted from a merchant or a widget submission.
pub const MAX_CHOICE_LENGTH: usize = 255;

/// Build the initial contents of a choice list.
///
/// Keeps the submitted order, drops duplicates (first occurrence wins) and
/// appends any fallback label that was not already submitted.
///
/// ```
/// use howheard_core::with_fallbacks;
///
/// let submitted = vec!["Instagram".to_string(), "Other".to_string(), "Instagram".to_string()];
/// let list = with_fallbacks(&submitted);
/// assert_eq!(list, ["Instagram", "Other", "From A Friend"]);
/// ```
#[must_use]
pub fn with_fallbacks(submitted: &[String]) -> Vec<String> {
    let mut choices: Vec<String> = Vec::with_capacity(submitted.len() + FALLBACK_CHOICES.len());
    let fallbacks = FALLBACK_CHOICES.iter().map(|s| (*s).to_string());
    for choice in submitted.iter().cloned().chain(fallbacks) {
        if !choices.contains(&choice) {
            choices.push(choice);
        }
    }
    choices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_submission_gets_fallbacks_only() {
        assert_eq!(with_fallbacks(&[]), ["From A Friend", "Other"]);
    }

    #[test]
    fn test_submitted_order_preserved() {
        let submitted = vec!["Podcast".to_string(), "Google".to_string()];
        assert_eq!(
            with_fallbacks(&submitted),
            ["Podcast", "Google", "From A Friend", "Other"]
        );
    }

    #[test]
    fn test_duplicates_removed() {
        let submitted = vec![
            "From A Friend".to_string(),
            "Google".to_string(),
            "Google".to_string(),
        ];
        assert_eq!(
            with_fallbacks(&submitted),
            ["From A Friend", "Google", "Other"]
        );
    }
}
