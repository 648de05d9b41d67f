use std::ops::Deref;

/// Read-only handle to a value, sealed at construction time
pub struct Immutable<T>(T);

impl<T> Immutable<T> {
    pub fn new(value: T) -> Self {
        Immutable(value)
    }
}

impl<T> Deref for Immutable<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immutable_deref() {
        struct Settings {
            limit: usize,
        }
        let settings = Immutable::new(Settings { limit: 42 });
        assert_eq!(settings.limit, 42);
    }
}
