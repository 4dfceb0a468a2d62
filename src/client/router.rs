#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Teacher,
    Student { test_id: String },
}

impl Route {
    /// `/test/{id}` opens a test for a student; every other path is the
    /// teacher view. Query strings and fragments are ignored.
    pub fn from_path(path: &str) -> Route {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.strip_suffix('/').unwrap_or(path);
        let mut segments = trimmed.strip_prefix('/').unwrap_or(trimmed).split('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some("test"), Some(id), None) if !id.is_empty() => Route::Student {
                test_id: id.to_string(),
            },
            _ => Route::Teacher,
        }
    }

    /// Accepts either a bare path or a full link such as the one returned by
    /// the export endpoint.
    pub fn from_location(location: &str) -> Route {
        match url::Url::parse(location) {
            Ok(url) => Route::from_path(url.path()),
            Err(_) => Route::from_path(location),
        }
    }

    pub fn test_id(&self) -> Option<&str> {
        match self {
            Route::Student { test_id } => Some(test_id),
            Route::Teacher => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: &str) -> Route {
        Route::Student { test_id: id.into() }
    }

    #[test]
    fn test_paths_open_student_mode() {
        assert_eq!(Route::from_path("/test/abc-123"), student("abc-123"));
        assert_eq!(Route::from_path("/test/abc/"), student("abc"));
        assert_eq!(Route::from_path("/test/abc?x=1"), student("abc"));
    }

    #[test]
    fn other_paths_stay_in_teacher_mode() {
        for path in ["/", "", "/test", "/test/", "/test/a/b", "/tests/a", "/api/test/a"] {
            assert_eq!(Route::from_path(path), Route::Teacher, "{path}");
        }
    }

    #[test]
    fn export_links_are_understood() {
        let route = Route::from_location("http://localhost:5000/test/xyz");
        assert_eq!(route.test_id(), Some("xyz"));
    }
}
