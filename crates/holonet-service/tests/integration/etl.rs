use holonet_service::transform::VehicleRecord;
use holonet_test::Upstream;

use crate::utils::{config, setup_services};

fn names(records: &[VehicleRecord]) -> Vec<&str> {
    records.iter().map(|record| record.name.as_str()).collect()
}

#[tokio::test]
async fn test_etl_dev() {
    let upstream = Upstream::new();
    let (services, _) = setup_services(&config(&upstream, false));

    let records = services.etl.run().await.unwrap();
    assert_eq!(
        names(&records),
        [
            "Sand Crawler",
            "Snowspeeder",
            "Sith speeder",
            "Single Trooper Aerial Platform"
        ]
    );

    let pilots: Vec<_> = records[1]
        .pilots
        .iter()
        .map(|pilot| pilot.name.as_str())
        .collect();
    assert_eq!(pilots, ["Luke Skywalker", "Wedge Antilles"]);
    assert_eq!(records[3].model, "N/A");
    assert_eq!(records[3].edited, "N/A");

    assert_eq!(upstream.hits("/vehicles"), 1);
    assert_eq!(upstream.hits("/vehicles?page=2"), 1);
    assert_eq!(upstream.hits("/api/people/?id=1,18"), 1);

    // everything is cached now
    upstream.accesses();
    services.etl.run().await.unwrap();
    assert_eq!(upstream.accesses(), 0);
}

#[tokio::test]
async fn test_etl_prod() {
    let upstream = Upstream::new();
    let (services, _) = setup_services(&config(&upstream, true));

    let records = services.etl.run().await.unwrap();
    assert_eq!(
        names(&records),
        ["Sith speeder", "Single Trooper Aerial Platform"]
    );
    assert_eq!(records[0].pilots[0].name, "Darth Maul");
    assert_eq!(upstream.hits("/api/vehicles"), 1);
    assert_eq!(upstream.hits("/vehicles"), 0);
}
