use secrecy::SecretString;

/// Runtime configuration shared with handlers via an axum `Extension`.
#[derive(Clone)]
pub struct GlobalArgs {
    pub webhook_secret: SecretString,
    pub frontend_origin: String,
    pub day_offset_minutes: i32,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(webhook_secret: SecretString, frontend_origin: String, day_offset_minutes: i32) -> Self {
        Self {
            webhook_secret,
            frontend_origin,
            day_offset_minutes,
        }
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("webhook_secret", &"***")
            .field("frontend_origin", &self.frontend_origin)
            .field("day_offset_minutes", &self.day_offset_minutes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new(
            SecretString::from("whsec_test"),
            "http://localhost:5173".to_string(),
            180,
        );
        assert_eq!(args.webhook_secret.expose_secret(), "whsec_test");
        assert_eq!(args.frontend_origin, "http://localhost:5173");
        assert_eq!(args.day_offset_minutes, 180);
    }

    #[test]
    fn test_debug_masks_secret() {
        let args = GlobalArgs::new(SecretString::from("whsec_test"), String::new(), 0);
        let debug = format!("{args:?}");
        assert!(!debug.contains("whsec_test"));
        assert!(debug.contains("***"));
    }
}
