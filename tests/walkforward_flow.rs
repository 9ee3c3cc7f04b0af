//! Walk-forward validation over the synthetic offline market.

use chrono::{Duration, TimeZone, Utc};
use evotrade::application::walkforward::WalkForwardAnalyzer;
use evotrade::config::WalkForwardConfig;
use evotrade::domain::walkforward::{recommend, Recommendation};
use evotrade::infrastructure::mock::SyntheticMarketDataService;
use std::sync::Arc;

fn analyzer(grid_points: usize) -> WalkForwardAnalyzer {
    let market_data = Arc::new(SyntheticMarketDataService::new(
        7,
        vec!["AAPL".to_string()],
        "SPY",
    ));
    let config = WalkForwardConfig {
        grid_points,
        ..WalkForwardConfig::default()
    };
    WalkForwardAnalyzer::new(market_data, config, "1Day")
}

#[tokio::test]
async fn test_windows_never_leak_training_data() {
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let end = start + Duration::days(600);

    let analysis = analyzer(3).analyze("AAPL", start, end).await.unwrap();
    assert!(analysis.windows.len() >= 2);

    for result in &analysis.windows {
        assert!(result.window.train_end < result.window.test_start);
        assert!((0.0..=1.0).contains(&result.overfitting_ratio));
        assert!(result.parameter_stability > 0.0 && result.parameter_stability <= 1.0);
    }

    // Consecutive test slices must not overlap.
    for pair in analysis.windows.windows(2) {
        assert!(pair[0].window.test_end <= pair[1].window.test_start);
    }
}

#[tokio::test]
async fn test_recommendation_matches_aggregate_scores() {
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let end = start + Duration::days(600);

    let analysis = analyzer(3).analyze("AAPL", start, end).await.unwrap();
    assert_eq!(
        analysis.recommendation,
        recommend(analysis.avg_oos_sharpe, analysis.overfitting_score)
    );
}

#[tokio::test]
async fn test_short_history_degrades_to_sell() {
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let end = start + Duration::days(90);

    let analysis = analyzer(3).analyze("AAPL", start, end).await.unwrap();
    assert!(analysis.windows.is_empty());
    assert_eq!(analysis.recommendation, Recommendation::Sell);
    assert_eq!(analysis.avg_oos_sharpe, 0.0);
    assert_eq!(analysis.parameter_stability, 0.0);
}
