//! Image -> application lookup.

use crate::domain::{Application, Result, RolloutError};

/// Static mapping of built images to configured applications.
#[derive(Debug, Clone, Default)]
pub struct ApplicationRegistry {
    applications: Vec<Application>,
}

impl ApplicationRegistry {
    pub fn new(applications: Vec<Application>) -> Self {
        Self { applications }
    }

    /// Find the application that deploys `image`.
    ///
    /// A miss is [`RolloutError::NoApplication`]; callers log it and drop
    /// the event.
    pub fn find_by_image(&self, image: &str) -> Result<&Application> {
        self.applications
            .iter()
            .find(|app| app.image == image)
            .ok_or_else(|| RolloutError::NoApplication {
                image: image.to_string(),
            })
    }

    pub fn applications(&self) -> &[Application] {
        &self.applications
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ApplicationRegistry {
        ApplicationRegistry::new(vec![
            Application {
                name: "foo".to_string(),
                image: "gcr.io/x/foo".to_string(),
                ..Default::default()
            },
            Application {
                name: "bar".to_string(),
                image: "gcr.io/x/bar".to_string(),
                ..Default::default()
            },
        ])
    }

    #[test]
    fn test_find_by_image() {
        let reg = registry();
        assert_eq!(reg.find_by_image("gcr.io/x/bar").unwrap().name, "bar");
        assert_eq!(reg.applications().len(), 2);
    }

    #[test]
    fn test_unknown_image_is_no_application() {
        let err = registry().find_by_image("gcr.io/x/baz").unwrap_err();
        assert!(matches!(err, RolloutError::NoApplication { ref image } if image == "gcr.io/x/baz"));
    }

    #[test]
    fn test_match_is_exact() {
        assert!(registry().find_by_image("gcr.io/x/fo").is_err());
        assert!(registry().find_by_image("gcr.io/x/foo:v1").is_err());
    }
}
