use super::*;
use tempfile::TempDir;

const TICKER_URL: &str = "https://ticker.example/stream/abc-123-DEF/live";

// =============================================================================
// title extraction
// =============================================================================

#[test]
fn parses_vs_separated_title() {
    let html = "<html><head><title>TSV Heimstadt vs. VC Gaststadt</title></head></html>";
    let state = parse_ticker_html(html, TICKER_URL);
    assert_eq!(state.home_team, "TSV Heimstadt");
    assert_eq!(state.away_team, "VC Gaststadt");
}

#[test]
fn falls_back_to_dash_separated_title() {
    let html = "<title>TSV Heimstadt - VC Gaststadt</title>";
    let state = parse_ticker_html(html, TICKER_URL);
    assert_eq!(state.home_team, "TSV Heimstadt");
    assert_eq!(state.away_team, "VC Gaststadt");
}

#[test]
fn away_team_is_cut_at_first_dash() {
    // Trailing ticker branding after the away team is dropped.
    let html = "<title>TSV Heimstadt vs. VC Gaststadt - Liveticker</title>";
    let state = parse_ticker_html(html, TICKER_URL);
    assert_eq!(state.away_team, "VC Gaststadt");
}

#[test]
fn missing_title_leaves_teams_empty() {
    let state = parse_ticker_html("<html><body>no title here</body></html>", TICKER_URL);
    assert!(state.home_team.is_empty());
    assert!(state.away_team.is_empty());
}

#[test]
fn title_without_separator_leaves_teams_empty() {
    let state = parse_ticker_html("<title>Spielbericht</title>", TICKER_URL);
    assert!(state.home_team.is_empty());
    assert!(state.away_team.is_empty());
}

// =============================================================================
// date extraction
// =============================================================================

#[test]
fn date_is_reordered_to_iso() {
    let html = "<title>A vs. B</title><p>Anpfiff am 15.03.2024 um 19:00</p>";
    let state = parse_ticker_html(html, TICKER_URL);
    assert_eq!(state.date, "2024-03-15");
}

#[test]
fn first_date_occurrence_wins() {
    let html = "<p>15.03.2024</p><p>16.03.2024</p>";
    let state = parse_ticker_html(html, TICKER_URL);
    assert_eq!(state.date, "2024-03-15");
}

#[test]
fn missing_date_defaults_to_today() {
    let state = parse_ticker_html("<title>A vs. B</title>", TICKER_URL);
    assert_eq!(state.date, crate::services::store::today());
}

// =============================================================================
// match id extraction
// =============================================================================

#[test]
fn match_id_comes_from_url() {
    let state = parse_ticker_html("", TICKER_URL);
    assert_eq!(state.match_id, "abc-123-DEF");
}

#[test]
fn url_without_stream_segment_leaves_id_empty() {
    let state = parse_ticker_html("", "https://ticker.example/match/42");
    assert!(state.match_id.is_empty());
}

#[test]
fn dvv_link_echoes_request_url() {
    let state = parse_ticker_html("", TICKER_URL);
    assert_eq!(state.dvv_link, TICKER_URL);
}

// =============================================================================
// result shape
// =============================================================================

#[test]
fn parse_result_is_unstamped() {
    let state = parse_ticker_html("<title>A vs. B</title>", TICKER_URL);
    assert_eq!(state.version, 0);
    assert!(state.last_updated.is_empty());
}

#[test]
fn fresh_document_shape() {
    let fresh = MatchdayState::fresh();
    assert_eq!(fresh.version, 1);
    assert_eq!(fresh.home_team, "Heim");
    assert_eq!(fresh.away_team, "Gast");
    assert!(fresh.dvv_link.is_empty());
}

#[test]
fn document_serializes_camel_case() {
    let json = serde_json::to_value(MatchdayState::fresh()).unwrap();
    assert!(json.get("homeTeam").is_some());
    assert!(json.get("awayTeam").is_some());
    assert!(json.get("dvvLink").is_some());
    assert!(json.get("matchId").is_some());
    assert!(json.get("lastUpdated").is_some());
}

// =============================================================================
// store
// =============================================================================

#[tokio::test]
async fn update_stamps_version_and_broadcast_payload_round_trips() {
    let dir = TempDir::new().unwrap();
    let store = MatchdayStore::open(dir.path()).unwrap();

    let stored = store
        .update(MatchdayState {
            home_team: "TSV".into(),
            away_team: "VC".into(),
            date: "2024-03-15".into(),
            ..MatchdayState::default()
        })
        .await
        .unwrap();

    assert_eq!(stored.version, 2);
    assert_eq!(stored.home_team, "TSV");
    assert_eq!(store.get().await.away_team, "VC");
}
