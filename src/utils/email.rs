use regex::Regex;

/// Loose email shape check for lead-capture fields. Bad addresses are dropped
/// from the contact, never a reason to fail the batch.
pub fn is_valid_email(email: &str) -> bool {
    let email_regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    email_regex.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("jane.doe+tag@sub.example.co"));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("jane example.com"));
        assert!(!is_valid_email("@example.com"));
    }
}
