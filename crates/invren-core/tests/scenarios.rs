//! End-to-end behaviour over a catalog loaded from disk.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use invren_core::catalog::{CollectorDirectory, SiteRecord};
use invren_core::compose::{compose, invoice_number_component};
use invren_core::error::{
    CollectorResolutionError, GovernorError, ResolutionError, SiteResolutionError,
};
use invren_core::governor::{LedgerStore, ManualClock};
use invren_core::models::config::{CatalogConfig, OperatorConfig};
use invren_core::observe::{GovernorEvent, RecordingObserver, ResolutionEvent};
use invren_core::resolve::{MatchConfidence, SiteStrategy};
use invren_core::{CallGovernor, EntityResolver, ExtractionResult, ReferenceCatalog, Renamer};

const SITES: &str = "Site;Entreprise;Collecte;Adresse\n\
    161;Mcdonald's CHALON SUR SAONE OBELISQUE;SUEZ;\n\
    1173;Mcdonald's CHALON SUR SAONE;SUEZ;\n\
    42;Mcdonald's LYON PART DIEU;SUEZ;17 rue du Docteur Bouchut 69003 Lyon\n\
    42;Mcdonald's LYON PART DIEU;REFOOD;17 rue du Docteur Bouchut 69003 Lyon\n\
    300;Brasserie du Port;VEOLIA;5 quai du Port 13002 Marseille\n";

const COLLECTORS: &str = "Collecte;Aliases;Combinations\n\
    SUEZ;Suez RV Centre Est;SUEZDIB, SUEZBIO, SUEZDIBBIO\n\
    VEOLIA;;\n\
    REFOOD;;\n";

fn write_catalog(dir: &Path) -> CatalogConfig {
    fs::write(dir.join("Restaurants.csv"), SITES).unwrap();
    fs::write(dir.join("Prestataires.csv"), COLLECTORS).unwrap();
    CatalogConfig {
        dir: dir.to_path_buf(),
        ..CatalogConfig::default()
    }
}

fn resolver(observer: Arc<RecordingObserver>) -> EntityResolver {
    let dir = tempfile::tempdir().unwrap();
    let catalog = ReferenceCatalog::load(&write_catalog(dir.path())).unwrap();
    EntityResolver::new(Arc::new(catalog))
        .with_operator(&OperatorConfig {
            names: vec!["SOCIETE RUBO".to_string()],
            addresses: vec!["34 Boulevard des Italiens 75009 Paris".to_string()],
        })
        .with_observer(observer)
}

/// Resolver over an in-memory site list, every site open to every collector.
fn resolver_over(sites: &[(&str, &str, &str)], observer: Arc<RecordingObserver>) -> EntityResolver {
    let collectors = CollectorDirectory::builder().approve("SUEZ").build().unwrap();
    let catalog = ReferenceCatalog::new(
        sites
            .iter()
            .map(|&(id, name, address)| SiteRecord::new(id, name, address, None)),
        collectors,
    )
    .unwrap();
    EntityResolver::new(Arc::new(catalog))
        .with_operator(&OperatorConfig {
            names: vec!["SOCIETE RUBO".to_string()],
            addresses: vec!["34 Boulevard des Italiens 75009 Paris".to_string()],
        })
        .with_observer(observer)
}

fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap(),
    ))
}

#[test]
fn test_shorter_location_variant_is_preferred() {
    let resolution = resolver(Arc::new(RecordingObserver::new()))
        .resolve("MAC DO CHALON", "SUEZ", Some(""))
        .unwrap();

    assert_eq!(resolution.site_id, "1173");
    assert_eq!(resolution.collector_key, "SUEZ");
    assert_eq!(resolution.site_strategy, SiteStrategy::NameRanking);
}

#[test]
fn test_operator_identity_is_never_used() {
    let observer = Arc::new(RecordingObserver::new());
    let resolver = resolver(observer.clone());

    let err = resolver
        .resolve("MAC DO CHALON", "SOCIETE RUBO", Some("34 Boulevard des Italiens"))
        .unwrap_err();
    assert!(matches!(
        err,
        ResolutionError::Collector(CollectorResolutionError::NoCollectorMatch {
            operator_excluded: true,
            ..
        })
    ));

    let site = resolver
        .resolve_site("MAC DO CHALON SUR SAONE", "SUEZ", Some("34 Boulevard des Italiens"))
        .unwrap();
    assert_eq!(site.site_id, "1173");
    assert_eq!(site.strategy.confidence(), MatchConfidence::Unvalidated);
    assert!(observer
        .resolution_events()
        .iter()
        .any(|e| matches!(e, ResolutionEvent::OperatorAddressDiscarded { .. })));
}

#[test]
fn test_neighbour_of_operator_address_is_kept() {
    let sites = [
        ("1", "Mcdonald's PARIS RIVOLI", "5 rue de Rivoli 75001 Paris"),
        ("2", "Mcdonald's PARIS ITALIENS", "12 Boulevard des Italiens 75009 Paris"),
    ];
    let observer = Arc::new(RecordingObserver::new());
    let resolver = resolver_over(&sites, observer.clone());

    let site = resolver
        .resolve_site("MAC DO PARIS", "SUEZ", Some("12 Boulevard des Italiens 75009 Paris"))
        .unwrap();
    assert_eq!(site.site_id, "2");
    assert_eq!(site.strategy, SiteStrategy::AddressDisambiguation);

    // a bare postal fragment of the operator's address is not the operator's address
    let fragment = resolver.resolve_site("MAC DO PARIS", "SUEZ", Some("75009 Paris"));
    assert!(matches!(fragment, Err(SiteResolutionError::NoSiteMatch { .. })));

    assert!(!observer
        .resolution_events()
        .iter()
        .any(|e| matches!(e, ResolutionEvent::OperatorAddressDiscarded { .. })));
}

#[test]
fn test_address_override_despite_postal_conflict() {
    let sites = [
        ("10", "Paul Gare", "10 rue de la Gare 71100 Chalon"),
        ("11", "Paul Centre", "Place de l'Hôtel de Ville 71100 Chalon"),
    ];
    let site = resolver_over(&sites, Arc::new(RecordingObserver::new()))
        .resolve_site("Paul", "SUEZ", Some("10 rue de la Gare 71000 Chalon"))
        .unwrap();

    assert_eq!(site.site_id, "10");
    assert_eq!(site.strategy, SiteStrategy::AddressDisambiguation);
    assert!(site.score.unwrap() >= 0.8);
}

#[test]
fn test_postal_score_searches_whole_catalog() {
    let sites = [
        ("20", "Paul Chalon Nord", "2 rue du Nord 71530 Crissey"),
        ("21", "Paul Chalon Sud", "8 rue du Sud 71530 Crissey"),
        ("22", "Paule Chalon", "10 rue de la Gare 71100 Chalon"),
        ("23", "Brasserie du Theatre", "1 place du Theatre 71100 Chalon"),
    ];
    let site = resolver_over(&sites, Arc::new(RecordingObserver::new()))
        .resolve_site("Paul Chalon", "SUEZ", Some("BP 45 71100 Chalon sur Saone"))
        .unwrap();

    // "Paule Chalon" is not among the name matches, only in the postal code
    assert_eq!(site.site_id, "22");
    assert_eq!(site.strategy, SiteStrategy::PostalScore);
    assert!(site.score.unwrap() >= 0.5);
}

#[test]
fn test_equal_ranking_is_ambiguous() {
    let sites = [
        ("30", "Paul Lyon", ""),
        ("31", "Paul Caen", ""),
    ];
    let err = resolver_over(&sites, Arc::new(RecordingObserver::new()))
        .resolve_site("Paul", "SUEZ", None)
        .unwrap_err();

    match err {
        SiteResolutionError::AmbiguousSiteMatch { candidates, .. } => {
            let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
            assert_eq!(ids.len(), 2);
            assert!(ids.contains(&"30") && ids.contains(&"31"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_invoice_number_sanitizing() {
    assert_eq!(invoice_number_component("H-0E/0228 333é").unwrap(), "H0E0228333");
}

#[test]
fn test_period_wins_over_invoice_date() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = ReferenceCatalog::load(&write_catalog(dir.path())).unwrap();
    let renamer = Renamer::new(EntityResolver::new(Arc::new(catalog)));

    let planned = renamer
        .plan(&ExtractionResult {
            entreprise: Some("MAC DO LYON PART DIEU".to_string()),
            provider: Some("Suez RV Centre Est".to_string()),
            address: Some("17 rue du Dr Bouchut, 69003 LYON".to_string()),
            date: Some("03/06/2025".to_string()),
            period: Some("01/05/2025 - 31/05/2025".to_string()),
            invoice_number: Some("118204".to_string()),
            ..ExtractionResult::default()
        })
        .unwrap();

    assert_eq!(planned.parts.period, "052025");
    assert_eq!(planned.filename, "42-SUEZ-052025-118204.pdf");
}

#[test]
fn test_unknown_provider_is_rejected() {
    let err = resolver(Arc::new(RecordingObserver::new()))
        .resolve_collector("Transports Martin & Fils")
        .unwrap_err();
    assert!(matches!(err, CollectorResolutionError::NoCollectorMatch { .. }));
}

#[test]
fn test_resolution_is_deterministic() {
    let resolver = resolver(Arc::new(RecordingObserver::new()));
    let inputs = [
        ("MAC DO CHALON", "SUEZ", None),
        ("McDonald's Lyon", "Suez RV", Some("17 rue du Docteur Bouchut 69003 Lyon")),
        ("Brasserie", "Veolia Propreté", Some("13002 Marseille")),
        ("Inconnu", "Transports Martin", None),
    ];

    for (entreprise, provider, address) in inputs {
        let first = resolver.resolve(entreprise, provider, address);
        let second = resolver.resolve(entreprise, provider, address);
        assert_eq!(first, second);
    }
}

#[test]
fn test_aliases_resolve_to_their_collector() {
    let resolver = resolver(Arc::new(RecordingObserver::new()));
    for (alias, key) in CatalogConfig::default().aliases {
        for text in [alias.clone(), alias.to_lowercase(), format!("Facture {alias} Centre")] {
            let found = resolver.resolve_collector(&text).unwrap();
            assert_eq!(found.key, key, "provider text {text:?}");
        }
    }
}

#[test]
fn test_compose_is_repeatable() {
    let first = compose("1173", "SUEZ", "01/05/2025 - 31/05/2025", "H-0E/0228").unwrap();
    for _ in 0..10 {
        assert_eq!(
            compose("1173", "SUEZ", "01/05/2025 - 31/05/2025", "H-0E/0228").unwrap(),
            first
        );
    }
    assert_eq!(first, "1173-SUEZ-052025-H0E0228");
}

#[test]
fn test_governor_never_exceeds_ceilings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    let clock = manual_clock();
    let governor = CallGovernor::builder(&path)
        .with_limits(4, 30)
        .with_clock(clock.clone())
        .open()
        .unwrap();

    // Irregular gaps between calls.
    let mut seed: u64 = 7;
    let mut admitted = 0;
    loop {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        clock.advance(Duration::from_secs(seed >> 60));
        match governor.admit() {
            Ok(_) => admitted += 1,
            Err(GovernorError::DailyLimitExceeded { count, limit, .. }) => {
                assert_eq!(count, limit);
                break;
            }
            Err(e) => panic!("unexpected governor error: {e}"),
        }
    }
    assert_eq!(admitted, 30);

    let ledger = LedgerStore::new(&path).load().unwrap().ledger;
    assert_eq!(ledger.recent_timestamps.len(), 30);
    for &t in &ledger.recent_timestamps {
        let in_window = ledger
            .recent_timestamps
            .iter()
            .filter(|&&other| other <= t && other > t - chrono::Duration::seconds(60))
            .count();
        assert!(in_window <= 4, "{in_window} calls in the minute ending {t}");
    }
}

#[test]
fn test_counts_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    let clock = manual_clock();

    {
        let governor = CallGovernor::builder(&path)
            .with_limits(10, 100)
            .with_clock(clock.clone())
            .open()
            .unwrap();
        for _ in 0..3 {
            governor.admit().unwrap();
        }
    }

    clock.advance(Duration::from_secs(1));
    let governor = CallGovernor::builder(&path)
        .with_limits(10, 100)
        .with_clock(clock.clone())
        .open()
        .unwrap();
    assert_eq!(governor.status().unwrap().requests_today, 3);
    assert_eq!(governor.admit().unwrap().daily_count, 4);
    assert_eq!(governor.status().unwrap().requests_last_minute, 4);
}

#[test]
fn test_corrupt_ledger_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    fs::write(&path, "{\"daily_counts\": {\"2025-06-03\": ").unwrap();

    let observer = Arc::new(RecordingObserver::new());
    let governor = CallGovernor::builder(&path)
        .with_clock(manual_clock())
        .with_observer(observer.clone())
        .open()
        .unwrap();

    assert!(observer
        .governor_events()
        .iter()
        .any(|e| matches!(e, GovernorEvent::LedgerReset { .. })));
    assert_eq!(governor.admit().unwrap().daily_count, 1);
}

#[test]
fn test_new_day_resets_daily_count() {
    let dir = tempfile::tempdir().unwrap();
    let clock = manual_clock();
    let governor = CallGovernor::builder(dir.path().join("ledger.json"))
        .with_limits(10, 2)
        .with_clock(clock.clone())
        .open()
        .unwrap();

    governor.admit().unwrap();
    governor.admit().unwrap();
    assert!(governor.admit().is_err());

    clock.advance(Duration::from_secs(24 * 3600));
    assert_eq!(governor.admit().unwrap().daily_count, 1);
}

#[test]
fn test_full_window_throttles_then_admits() {
    let dir = tempfile::tempdir().unwrap();
    let observer = Arc::new(RecordingObserver::new());
    let governor = CallGovernor::builder(dir.path().join("ledger.json"))
        .with_limits(2, 100)
        .with_clock(manual_clock())
        .with_observer(observer.clone())
        .open()
        .unwrap();

    governor.admit().unwrap();
    governor.admit().unwrap();
    let third = governor.admit().unwrap();

    assert_eq!(third.waited, Duration::from_secs(60));
    assert_eq!(third.daily_count, 3);
    assert!(observer.governor_events().iter().any(|e| matches!(
        e,
        GovernorEvent::Throttled { wait, window_count: 2 } if *wait == Duration::from_secs(60)
    )));
}

#[test]
fn test_clock_set_back_keeps_minute_quota() {
    let dir = tempfile::tempdir().unwrap();
    let clock = manual_clock();
    let governor = CallGovernor::builder(dir.path().join("ledger.json"))
        .with_limits(2, 100)
        .with_clock(clock.clone())
        .open()
        .unwrap();

    governor.admit().unwrap();
    governor.admit().unwrap();

    clock.set(Utc.with_ymd_and_hms(2025, 6, 3, 9, 59, 30).unwrap());
    assert_eq!(governor.status().unwrap().requests_last_minute, 2);
    assert!(matches!(
        governor.admit_within(Some(Duration::from_secs(5))),
        Err(GovernorError::WaitTimeout { .. })
    ));
    assert_eq!(governor.status().unwrap().requests_today, 2);
}
