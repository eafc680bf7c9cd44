use holonet_service::services::{Dataset, FlightReport, LongestFlight};
use holonet_test::Upstream;

use crate::utils::{config, setup_services};

#[tokio::test]
async fn test_longest_flight_real() {
    let upstream = Upstream::new();
    let (services, store) = setup_services(&config(&upstream, false));

    let report = services.flights.longest_flight(Dataset::Real).await.unwrap();
    assert_eq!(
        report,
        FlightReport::Longest(LongestFlight {
            person: "Ronald Mundy".into(),
            distance: 3100.0,
            airlines: vec!["AA".into(), "MU".into()],
        })
    );
    assert_eq!(upstream.accesses(), 2);
    assert!(store.get_raw("odata_flight_trip_pin_people_real").is_some());

    services.flights.longest_flight(Dataset::Real).await.unwrap();
    assert_eq!(upstream.accesses(), 0);
}

#[tokio::test]
async fn test_longest_flight_mock() {
    let upstream = Upstream::new();
    let (services, _) = setup_services(&config(&upstream, false));

    let report = services.flights.longest_flight(Dataset::Mock).await.unwrap();
    let FlightReport::Longest(longest) = report else {
        panic!("expected a longest flight, got {report:?}");
    };
    assert_eq!(longest.person, "Jane Smith");
    assert_eq!(upstream.accesses(), 0);
}
