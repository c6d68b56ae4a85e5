//! Mood trend notifications.
//!
//! A pass looks at the latest seven mood entries and fires one notification
//! per matching category, at most once per category per 24 hours.

use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::db::{KvStore, StoreError, StoreKey};
use crate::models::mood::MoodEntry;
use crate::models::settings::{AppSettings, NotificationFrequency};
use crate::models::subscription::{Entitlements, SubscriptionTier};
use crate::models::trend::TrendCategory;
use crate::services::notifier::{
    NotificationAction, NotificationCenter, PlatformNotification, ToastKind,
};

pub const WINDOW_SIZE: usize = 7;
pub const MIN_ENTRIES: usize = 3;
pub const COOLDOWN_MS: i64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

const SUPPORT_LOW_DAYS: usize = 3;
const CARE_LOW_STREAK: usize = 2;
const POSITIVE_MEAN: f64 = 7.0;
const STABILITY_VARIANCE: f64 = 6.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub window: usize,
    pub mean: f64,
    pub low_days: usize,
    pub longest_low_streak: usize,
    pub variance: f64,
}

impl TrendReport {
    /// Every category whose threshold is met. Categories are independent.
    pub fn matched(&self) -> Vec<TrendCategory> {
        let mut matched = Vec::new();
        if self.low_days >= SUPPORT_LOW_DAYS {
            matched.push(TrendCategory::Support);
        }
        if self.longest_low_streak >= CARE_LOW_STREAK {
            matched.push(TrendCategory::Care);
        }
        if self.mean >= POSITIVE_MEAN {
            matched.push(TrendCategory::Positive);
        }
        if self.variance > STABILITY_VARIANCE {
            matched.push(TrendCategory::Stability);
        }
        matched
    }
}

/// Statistics over the most recent entries. `None` below the minimum
/// history size.
pub fn analyze(history: &[MoodEntry]) -> Option<TrendReport> {
    if history.len() < MIN_ENTRIES {
        return None;
    }

    let mut ordered: Vec<&MoodEntry> = history.iter().collect();
    ordered.sort_by_key(|e| e.timestamp);
    let recent = &ordered[ordered.len().saturating_sub(WINDOW_SIZE)..];

    let values: Vec<f64> = recent.iter().map(|e| e.mood.value() as f64).collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let low_days = recent.iter().filter(|e| e.mood.is_low()).count();

    let mut longest_low_streak = 0;
    let mut streak = 0;
    for entry in recent.iter().rev() {
        if entry.mood.is_low() {
            streak += 1;
            longest_low_streak = longest_low_streak.max(streak);
        } else {
            streak = 0;
        }
    }

    Some(TrendReport {
        window: recent.len(),
        mean,
        low_days,
        longest_low_streak,
        variance,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTrigger {
    Startup,
    Scheduled,
    /// Asked for explicitly. Ignores the frequency setting and quiet hours.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassOutcome {
    NotEntitled,
    Muted,
    InsufficientData { entries: usize },
    QuietHours,
    Analyzed {
        report: TrendReport,
        fired: Vec<TrendCategory>,
    },
}

impl PassOutcome {
    pub fn fired(&self) -> &[TrendCategory] {
        match self {
            PassOutcome::Analyzed { fired, .. } => fired.as_slice(),
            _ => &[],
        }
    }
}

#[derive(Clone)]
pub struct TrendNotifier {
    store: KvStore,
    notifier: NotificationCenter,
}

/// Handle to the periodic analysis task. Dropping it stops the timer.
pub struct TrendTask {
    handle: JoinHandle<()>,
}

impl Drop for TrendTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl TrendNotifier {
    pub fn new(store: KvStore, notifier: NotificationCenter) -> Self {
        Self { store, notifier }
    }

    /// Run one pass immediately, then every `interval`. A zero interval
    /// falls back to [`DEFAULT_INTERVAL`].
    pub fn spawn(self, interval: Duration) -> TrendTask {
        let interval = if interval.is_zero() {
            tracing::warn!("Zero trend interval, using the default");
            DEFAULT_INTERVAL
        } else {
            interval
        };
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut trigger = PassTrigger::Startup;
            loop {
                ticker.tick().await;
                match self.run_pass(Utc::now(), trigger).await {
                    Ok(outcome) => {
                        tracing::debug!(?trigger, fired = outcome.fired().len(), "Trend pass finished");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Trend pass failed");
                    }
                }
                trigger = PassTrigger::Scheduled;
            }
        });
        TrendTask { handle }
    }

    pub async fn run_pass(&self, now: DateTime<Utc>, trigger: PassTrigger) -> Result<PassOutcome, StoreError> {
        let mut keys = vec![StoreKey::MoodHistory, StoreKey::Subscription, StoreKey::AppSettings];
        keys.extend(TrendCategory::ALL.iter().map(|c| StoreKey::TrendCooldown(*c)));

        let local_time = now.with_timezone(&Local).time();
        let now_ms = now.timestamp_millis();

        let outcome = self
            .store
            .transact(&keys, move |snapshot| {
                let tier: SubscriptionTier = snapshot.read(StoreKey::Subscription);
                if !Entitlements::for_tier(tier).mood_trend_alerts {
                    return PassOutcome::NotEntitled;
                }

                let settings: AppSettings = snapshot.read(StoreKey::AppSettings);
                if trigger != PassTrigger::Manual
                    && settings.notification_frequency == NotificationFrequency::Off
                {
                    return PassOutcome::Muted;
                }
                if trigger == PassTrigger::Scheduled && settings.in_quiet_hours(local_time) {
                    return PassOutcome::QuietHours;
                }

                let history: Vec<MoodEntry> = snapshot
                    .read_list(StoreKey::MoodHistory)
                    .map(|list| list.items)
                    .unwrap_or_default();
                let Some(report) = analyze(&history) else {
                    return PassOutcome::InsufficientData {
                        entries: history.len(),
                    };
                };

                let mut fired = Vec::new();
                for category in report.matched() {
                    let key = StoreKey::TrendCooldown(category);
                    let last: Option<i64> = snapshot.read_opt(key);
                    if last.is_some_and(|last| now_ms - last < COOLDOWN_MS) {
                        continue;
                    }
                    // Cooldowns never move backwards.
                    snapshot.write(key, &last.map_or(now_ms, |last| last.max(now_ms)));
                    fired.push(category);
                }

                PassOutcome::Analyzed { report, fired }
            })
            .await?;

        for category in outcome.fired() {
            self.dispatch(*category).await;
        }

        Ok(outcome)
    }

    /// Current statistics without firing anything.
    pub async fn report(&self) -> Result<Option<TrendReport>, StoreError> {
        let history: Vec<MoodEntry> = self.store.load_list(StoreKey::MoodHistory).await?;
        Ok(analyze(&history))
    }

    async fn dispatch(&self, category: TrendCategory) {
        tracing::info!(category = category.as_str(), "Mood trend notification");

        let mut notification = PlatformNotification::new(category.title(), category.message())
            .with_tag(format!("mood-trend-{}", category.as_str()))
            .with_icon("/icons/icon-192x192.png");
        if matches!(category, TrendCategory::Support | TrendCategory::Care) {
            notification = notification.with_actions(local_mood_actions());
        }
        self.notifier.platform(notification).await;

        let kind = match category {
            TrendCategory::Positive => ToastKind::Success,
            _ => ToastKind::Info,
        };
        self.notifier
            .toast(kind, category.title(), category.message())
            .await;
    }
}

/// Quick actions on locally raised notifications: `mood-1` .. `mood-5`.
pub fn local_mood_actions() -> Vec<NotificationAction> {
    (1..=5)
        .map(|n| NotificationAction {
            action: format!("mood-{n}"),
            title: n.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_store;
    use crate::models::mood::MoodScore;
    use crate::models::settings::QuietHours;
    use crate::services::notifier::Permission;
    use chrono::{Duration as ChronoDuration, NaiveTime};

    fn entries(moods: &[i64], end: DateTime<Utc>) -> Vec<MoodEntry> {
        let n = moods.len() as i64;
        moods
            .iter()
            .enumerate()
            .map(|(i, m)| {
                MoodEntry::new(
                    MoodScore::new(*m).unwrap(),
                    end - ChronoDuration::hours(n - 1 - i as i64),
                )
            })
            .collect()
    }

    async fn setup(tier: SubscriptionTier, moods: &[i64], now: DateTime<Utc>) -> (KvStore, NotificationCenter, TrendNotifier) {
        let store = memory_store().await;
        store.save(StoreKey::Subscription, tier).await.unwrap();
        store
            .save(StoreKey::MoodHistory, entries(moods, now))
            .await
            .unwrap();
        let notifier = NotificationCenter::new(Permission::Granted);
        let trends = TrendNotifier::new(store.clone(), notifier.clone());
        (store, notifier, trends)
    }

    fn now() -> DateTime<Utc> {
        "2024-03-10T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_analyze_requires_three_entries() {
        assert!(analyze(&entries(&[1, 1], now())).is_none());
        assert!(analyze(&entries(&[1, 1, 1], now())).is_some());
    }

    #[test]
    fn test_analyze_uses_last_seven_by_time() {
        let report = analyze(&entries(&[1, 1, 1, 9, 9, 9, 9, 9, 9, 9], now())).unwrap();
        assert_eq!(report.window, 7);
        assert_eq!(report.low_days, 0);
        assert!((report.mean - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_analyze_statistics() {
        let report = analyze(&entries(&[8, 8, 2, 2, 2, 9], now())).unwrap();
        assert_eq!(report.low_days, 3);
        assert_eq!(report.longest_low_streak, 3);
        assert!((report.mean - 31.0 / 6.0).abs() < 1e-9);
        assert!(report.variance > 6.0);
        assert_eq!(
            report.matched(),
            vec![TrendCategory::Support, TrendCategory::Care, TrendCategory::Stability]
        );
    }

    #[test]
    fn test_care_without_support() {
        let report = analyze(&entries(&[7, 7, 3, 3, 7], now())).unwrap();
        assert_eq!(report.matched(), vec![TrendCategory::Care]);
    }

    #[tokio::test]
    async fn test_free_tier_is_skipped() {
        let (_, notifier, trends) = setup(SubscriptionTier::Free, &[9, 9, 9], now()).await;
        let outcome = trends.run_pass(now(), PassTrigger::Startup).await.unwrap();
        assert_eq!(outcome, PassOutcome::NotEntitled);
        assert!(notifier.recent_toasts().await.is_empty());
    }

    #[tokio::test]
    async fn test_fewer_than_three_entries_fires_nothing() {
        let (_, notifier, trends) = setup(SubscriptionTier::Plus, &[1, 1], now()).await;
        let outcome = trends.run_pass(now(), PassTrigger::Startup).await.unwrap();
        assert_eq!(outcome, PassOutcome::InsufficientData { entries: 2 });
        assert!(notifier.recent_toasts().await.is_empty());
    }

    #[tokio::test]
    async fn test_positive_cooldown_window() {
        let (store, _, trends) = setup(SubscriptionTier::Pro, &[8, 8, 8], now()).await;

        let first = trends.run_pass(now(), PassTrigger::Startup).await.unwrap();
        assert_eq!(first.fired(), &[TrendCategory::Positive]);

        let later = now() + ChronoDuration::hours(23);
        let second = trends.run_pass(later, PassTrigger::Startup).await.unwrap();
        assert!(second.fired().is_empty());

        let much_later = now() + ChronoDuration::hours(25);
        let third = trends.run_pass(much_later, PassTrigger::Startup).await.unwrap();
        assert_eq!(third.fired(), &[TrendCategory::Positive]);

        let stamp: i64 = store
            .load(StoreKey::TrendCooldown(TrendCategory::Positive))
            .await
            .unwrap();
        assert_eq!(stamp, much_later.timestamp_millis());
    }

    #[tokio::test]
    async fn test_end_to_end_low_streak_scenario() {
        let (store, notifier, trends) = setup(SubscriptionTier::Plus, &[8, 8, 2, 2, 2, 9], now()).await;
        let mut rx = notifier.subscribe();

        let outcome = trends.run_pass(now(), PassTrigger::Startup).await.unwrap();
        assert_eq!(
            outcome.fired(),
            &[TrendCategory::Support, TrendCategory::Care, TrendCategory::Stability]
        );

        for category in [TrendCategory::Support, TrendCategory::Care, TrendCategory::Stability] {
            let stamp: i64 = store.load(StoreKey::TrendCooldown(category)).await.unwrap();
            assert_eq!(stamp, now().timestamp_millis());
        }

        let again = trends.run_pass(now(), PassTrigger::Startup).await.unwrap();
        assert!(again.fired().is_empty());
        assert_eq!(notifier.recent_toasts().await.len(), 3);

        // Platform notification for "support" carries local quick actions.
        let mut saw_actions = false;
        while let Ok(event) = rx.try_recv() {
            if let crate::services::notifier::NotificationEvent::Platform(n) = event {
                if n.tag.as_deref() == Some("mood-trend-support") {
                    assert_eq!(n.actions.len(), 5);
                    assert_eq!(n.actions[0].action, "mood-1");
                    saw_actions = true;
                }
            }
        }
        assert!(saw_actions);
    }

    #[tokio::test]
    async fn test_scheduled_pass_respects_quiet_hours() {
        let (store, _, trends) = setup(SubscriptionTier::Plus, &[8, 8, 8], now()).await;
        let all_day = QuietHours {
            start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
        };
        let local = now().with_timezone(&Local).time();
        assert!(all_day.contains(local));
        store
            .save(
                StoreKey::AppSettings,
                AppSettings {
                    quiet_hours: Some(all_day),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let scheduled = trends.run_pass(now(), PassTrigger::Scheduled).await.unwrap();
        assert_eq!(scheduled, PassOutcome::QuietHours);

        let startup = trends.run_pass(now(), PassTrigger::Startup).await.unwrap();
        assert_eq!(startup.fired(), &[TrendCategory::Positive]);
    }

    #[tokio::test]
    async fn test_frequency_off_mutes_automatic_passes() {
        let (store, notifier, trends) = setup(SubscriptionTier::Pro, &[8, 8, 8], now()).await;
        store
            .save(
                StoreKey::AppSettings,
                AppSettings {
                    notification_frequency: NotificationFrequency::Off,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        for trigger in [PassTrigger::Startup, PassTrigger::Scheduled] {
            let outcome = trends.run_pass(now(), trigger).await.unwrap();
            assert_eq!(outcome, PassOutcome::Muted);
        }
        assert!(notifier.recent_toasts().await.is_empty());
        let cooldown: Option<i64> = store
            .transact(&[StoreKey::TrendCooldown(TrendCategory::Positive)], |s| {
                s.read_opt(StoreKey::TrendCooldown(TrendCategory::Positive))
            })
            .await
            .unwrap();
        assert!(cooldown.is_none());

        let manual = trends.run_pass(now(), PassTrigger::Manual).await.unwrap();
        assert_eq!(manual.fired(), &[TrendCategory::Positive]);
    }

    #[tokio::test]
    async fn test_zero_interval_still_runs_startup_pass() {
        let (_, notifier, trends) = setup(SubscriptionTier::Plus, &[8, 8, 8], now()).await;
        let mut events = notifier.subscribe();

        let _task = trends.spawn(Duration::ZERO);
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert!(event.is_ok());
    }
}
