use holonet_service::services::{Character, SearchError};
use holonet_test::Upstream;

use crate::utils::{config, setup_services};

#[tokio::test]
async fn test_search_characters() {
    let upstream = Upstream::new();
    let (services, store) = setup_services(&config(&upstream, true));

    let characters = services.characters.search("Grievous").await.unwrap();
    assert_eq!(
        characters,
        vec![Character {
            name: "General Grievous".into(),
            species: vec!["Kaleesh".into()],
            edited: Some("2014-12-20T21:17:56.891000Z".into()),
            film_count: 2,
        }]
    );
    assert!(store.get_raw("species_2").is_some());
    assert!(store.get_raw("films_6").is_some());

    // the search is never cached, its species and films are
    upstream.accesses();
    services.characters.search("Grievous").await.unwrap();
    assert_eq!(upstream.accesses(), 1);
}

#[tokio::test]
async fn test_search_forbidden_in_dev() {
    let upstream = Upstream::new();
    let (services, _) = setup_services(&config(&upstream, false));

    let err = services.characters.search("Grievous").await.unwrap_err();
    assert!(matches!(err, SearchError::Forbidden));
    assert_eq!(upstream.accesses(), 0);
}
