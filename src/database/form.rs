use std::str::FromStr;

use super::error::TypeError;

pub type FormData = Vec<(String, String)>;

/// Query string parameters, keeping repeated keys (`?tags=a&tags=b`).
#[derive(Debug, Clone, Default)]
pub struct Form {
    inner: FormData,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<String> {
        self.inner
            .iter()
            .filter(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.to_owned())
            .collect()
    }

    pub fn get_number<T>(&self, key: &str) -> Result<Option<T>, TypeError>
    where
        T: FromStr,
    {
        match self.get_str(key) {
            Some(value) if !value.trim().is_empty() => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_e| TypeError::new(&format!("Invalid value for '{key}'"))),
            _ => Ok(None),
        }
    }

    /// Lenient variant: anything that is not a non-negative integer yields the default.
    pub fn get_limit(&self, key: &str, default: i64) -> i64 {
        match self.get_number::<i64>(key) {
            Ok(Some(value)) if value >= 0 => value,
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> Form {
        Form::from_data(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn repeated_keys_are_collected() {
        let form = form(&[("tags", "breakfast"), ("author", "3"), ("tags", "lunch")]);
        assert_eq!(form.get_all("tags"), vec!["breakfast", "lunch"]);
        assert_eq!(form.get_str("author"), Some("3"));
        assert!(form.get_all("missing").is_empty());
    }

    #[test]
    fn numbers_are_parsed_or_rejected() {
        let form = form(&[("author", "12"), ("page", "two"), ("empty", "")]);
        assert_eq!(form.get_number::<i32>("author").unwrap(), Some(12));
        assert_eq!(form.get_number::<i32>("missing").unwrap(), None);
        assert_eq!(form.get_number::<i32>("empty").unwrap(), None);
        assert!(form.get_number::<i32>("page").is_err());
    }

    #[test]
    fn limit_falls_back_on_invalid_values() {
        assert_eq!(form(&[("recipes_limit", "2")]).get_limit("recipes_limit", 6), 2);
        assert_eq!(form(&[("recipes_limit", "0")]).get_limit("recipes_limit", 6), 0);
        assert_eq!(form(&[("recipes_limit", "-1")]).get_limit("recipes_limit", 6), 6);
        assert_eq!(form(&[("recipes_limit", "abc")]).get_limit("recipes_limit", 6), 6);
        assert_eq!(form(&[]).get_limit("recipes_limit", 6), 6);
    }
}
