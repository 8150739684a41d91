/// End-to-end behavior of the rule-based assistant over a small catalog
use brando_imoveis::assistant::{self, evaluate, respond, ADDRESS, FALLBACK, GREETING, NO_MATCH};
use brando_imoveis::models::{Listing, ListingStatus};
use chrono::Utc;

fn listing(id: i64, code: &str, kind: &str, hood: &str, price: f64, status: ListingStatus) -> Listing {
    Listing {
        id,
        code: code.to_string(),
        kind: kind.to_string(),
        price,
        neighborhood: Some(hood.to_string()),
        description: None,
        image: None,
        status,
        created_at: Utc::now(),
        cover_photo_id: None,
    }
}

fn catalog() -> Vec<Listing> {
    vec![
        listing(1, "BR-001", "Casa", "Ratones", 500_000.0, ListingStatus::Active),
        listing(2, "BR-002", "Apartamento", "Canasvieiras", 650_000.0, ListingStatus::Active),
        listing(3, "BR-003", "Casa", "Jurerê Internacional", 2_400_000.0, ListingStatus::Active),
        listing(4, "BR-004", "Casa", "Ratones", 300_000.0, ListingStatus::Inactive),
    ]
}

#[test]
fn test_empty_query_greets() {
    assert_eq!(respond("", &catalog()), GREETING);
    assert_eq!(respond("   ", &catalog()), GREETING);
}

#[test]
fn test_type_and_neighborhood_match_mentions_listing() {
    let (rule, answer) = evaluate("casa em ratones", &catalog());
    assert_eq!(rule, "listing_matches");
    assert!(answer.contains("Casa em Ratones (R$ 500.000)"));
    // inactive listings are never suggested
    assert!(!answer.contains("300.000"));
}

#[test]
fn test_criteria_without_matches_returns_no_match_text() {
    let (rule, answer) = evaluate("apartamento até 100 mil", &catalog());
    assert_eq!(rule, "no_match");
    assert_eq!(answer, NO_MATCH);
}

#[test]
fn test_price_ceiling_filters() {
    let answer = respond("casa até 1 milhão", &catalog());
    assert!(answer.contains("Casa em Ratones (R$ 500.000)"));
    assert!(!answer.contains("Jurerê"));
}

#[test]
fn test_canned_answers() {
    assert_eq!(respond("onde fica a loja", &catalog()), ADDRESS);
    assert_eq!(evaluate("vocês fazem financiamento?", &catalog()).0, "financing");
    assert_eq!(evaluate("qual o creci de vocês", &catalog()).0, "creci");
}

#[test]
fn test_listing_rule_wins_over_canned_keywords() {
    let (rule, _) = evaluate("quero comprar casa em ratones", &catalog());
    assert_eq!(rule, "listing_matches");
}

#[test]
fn test_unrecognized_query_falls_back() {
    assert_eq!(respond("bom dia", &catalog()), FALLBACK);
}

#[test]
fn test_rule_order_is_stable() {
    let names = assistant::rule_names();
    assert_eq!(
        names,
        vec![
            "listing_matches",
            "buy",
            "financing",
            "documents",
            "visit",
            "rent",
            "contract",
            "service_request",
            "renovation",
            "neighborhoods",
            "price_hint",
            "investment",
            "business_hours",
            "address",
            "contact",
            "creci",
            "about",
            "technology",
            "no_match",
            "fallback",
        ]
    );
}
