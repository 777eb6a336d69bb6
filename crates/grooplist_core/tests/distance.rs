use grooplist_core::proximity::distance::{distance, haversine, DistanceUnit};
use grooplist_core::{default_store_catalog, Location};

#[test]
fn distance_to_self_is_zero() {
    for store in default_store_catalog() {
        let here = Location::new(store.latitude, store.longitude, 0).unwrap();
        assert_eq!(distance(&here, &store, DistanceUnit::Miles), 0.0);
    }
}

#[test]
fn distance_is_symmetric() {
    let pairs = [
        (37.7749, -122.4194, 37.7849, -122.4094),
        (-33.8688, 151.2093, 51.5074, -0.1278),
        (89.9, 0.0, -89.9, 179.9),
    ];
    for (lat1, lng1, lat2, lng2) in pairs {
        let there = haversine(lat1, lng1, lat2, lng2, DistanceUnit::Miles);
        let back = haversine(lat2, lng2, lat1, lng1, DistanceUnit::Miles);
        assert!((there - back).abs() < 1e-9);
    }
}

#[test]
fn whole_foods_to_safeway_matches_reference_values() {
    let miles = haversine(37.7749, -122.4194, 37.7849, -122.4094, DistanceUnit::Miles);
    let km = haversine(37.7749, -122.4194, 37.7849, -122.4094, DistanceUnit::Kilometers);
    assert!((miles - 0.8807).abs() < 1e-3, "got {miles}");
    assert!((km - 1.4173).abs() < 1e-3, "got {km}");
}

#[test]
fn unit_labels_are_short() {
    assert_eq!(DistanceUnit::Miles.label(), "mi");
    assert_eq!(DistanceUnit::Kilometers.label(), "km");
    assert_eq!(DistanceUnit::default(), DistanceUnit::Miles);
}
