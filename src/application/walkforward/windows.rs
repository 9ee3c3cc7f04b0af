//! Rolling train/test window construction.

use crate::config::WalkForwardConfig;
use crate::domain::walkforward::WalkForwardWindow;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

/// Build the rolling window sequence over `[start, end]`.
///
/// Each window trains on `train_days` and tests on the following
/// `test_days`, then the whole frame slides forward by `test_days` so test
/// slices tile the range without overlap. The test slice always begins one
/// day after training ends; a final partial test slice is kept only if it
/// still spans `min_window_days`.
pub fn build_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    config: &WalkForwardConfig,
) -> Vec<WalkForwardWindow> {
    // The frame slides by test_days each pass; a non-positive span would
    // never terminate.
    if config.train_days <= 0 || config.test_days <= 0 {
        warn!(
            train_days = config.train_days,
            test_days = config.test_days,
            "non-positive window span, no windows built"
        );
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut train_start = start;
    let mut window_num = 1;

    loop {
        let train_end = train_start + Duration::days(config.train_days);
        let test_start = train_end + Duration::days(1);
        if test_start >= end {
            break;
        }
        let test_end = (test_start + Duration::days(config.test_days)).min(end);

        let train_span = (train_end - train_start).num_days();
        let test_span = (test_end - test_start).num_days();
        if train_span < config.min_window_days || test_span < config.min_window_days {
            debug!(
                window_num,
                train_span, test_span, "window below minimum span, skipping"
            );
        } else {
            windows.push(WalkForwardWindow {
                window_num,
                start_date: train_start,
                end_date: test_end,
                train_start,
                train_end,
                test_start,
                test_end,
            });
            window_num += 1;
        }

        if test_end >= end {
            break;
        }
        train_start += Duration::days(config.test_days);
    }

    windows
}
