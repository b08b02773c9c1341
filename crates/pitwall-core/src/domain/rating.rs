//! Rating resolution: one comparable skill number per driver.

use pitwall_state::Driver;

/// Rating used when a driver has no observations at all.
pub const DEFAULT_RATING: f64 = 0.0;

/// Resolve the rating the balancer compares.
///
/// Prefers the observation in `primary_category`, then the first observation
/// recorded, then [`DEFAULT_RATING`].
pub fn resolve_rating(driver: &Driver, primary_category: Option<&str>) -> f64 {
    primary_category
        .and_then(|category| driver.ratings.iter().find(|r| r.category == category))
        .or_else(|| driver.ratings.first())
        .map(|r| r.value)
        .unwrap_or(DEFAULT_RATING)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_category_wins() {
        let driver = Driver::user("u1", "Alice")
            .with_rating("oval", 1200.0)
            .with_rating("sports_car", 2300.0);
        assert_eq!(resolve_rating(&driver, Some("sports_car")), 2300.0);
    }

    #[test]
    fn falls_back_to_first_observation() {
        let driver = Driver::user("u1", "Alice")
            .with_rating("oval", 1200.0)
            .with_rating("dirt", 900.0);
        assert_eq!(resolve_rating(&driver, Some("sports_car")), 1200.0);
        assert_eq!(resolve_rating(&driver, None), 1200.0);
    }

    #[test]
    fn unrated_driver_is_zero() {
        let driver = Driver::manual("entry-1", "Guest");
        assert_eq!(resolve_rating(&driver, Some("sports_car")), DEFAULT_RATING);
    }
}
