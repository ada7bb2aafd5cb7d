use crate::calls::CallPlacer;
use crate::entities::check_in::{self, CheckInStatus};
use crate::entities::{recipient, user};
use crate::notifications::ConcernNotifier;
use crate::scripts::{self, ScriptGenerator};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// An answered call shorter than this is treated as effectively unanswered;
/// nothing meaningful fits into four seconds.
const MIN_MEANINGFUL_CALL_SECS: i64 = 5;

/// Machine-detection values that count as a person picking up.
const HUMAN_ANSWERS: [&str; 2] = ["human", "simulated-human"];

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The only domain error that escapes the orchestrator: `trigger` was
    /// asked for a recipient that does not exist.
    #[error("recipient not found")]
    RecipientNotFound,
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

/// Owns the check-in lifecycle: places the outbound call, correlates the
/// provider's webhooks back to a record, classifies the outcome and fires
/// the concern notification. One instance is shared across request handlers.
#[derive(Clone)]
pub struct CheckInPipeline {
    // Arc because DatabaseConnection is not Clone when the mock backend
    // is compiled in.
    db: Arc<DatabaseConnection>,
    calls: Arc<dyn CallPlacer>,
    notifier: Arc<dyn ConcernNotifier>,
    scripts: ScriptGenerator,
    base_url: String,
}

/// First match wins: non-human answer, too short, otherwise OK. CONCERN and
/// EMERGENCY are never produced from this signal alone; they would need
/// content analysis layered on separately.
pub fn classify_outcome(answered_by: Option<&str>, duration_secs: i64) -> CheckInStatus {
    match answered_by {
        Some(v) if HUMAN_ANSWERS.contains(&v) => {
            if duration_secs < MIN_MEANINGFUL_CALL_SECS {
                CheckInStatus::NoAnswer
            } else {
                CheckInStatus::Ok
            }
        }
        _ => CheckInStatus::NoAnswer,
    }
}

impl CheckInPipeline {
    pub fn new(
        db: Arc<DatabaseConnection>,
        calls: Arc<dyn CallPlacer>,
        notifier: Arc<dyn ConcernNotifier>,
        scripts: ScriptGenerator,
        base_url: String,
    ) -> Self {
        Self {
            db,
            calls,
            notifier,
            scripts,
            base_url,
        }
    }

    /// Creates a fresh PENDING attempt for the recipient and asks the
    /// provider to place the call. A placement failure resolves the attempt
    /// as NO_ANSWER on the spot (no automatic retry); the caller still gets
    /// the record back either way. Each invocation is an independent
    /// attempt; a caregiver may deliberately re-trigger after a failure.
    pub async fn trigger(&self, recipient_id: i32) -> Result<check_in::Model, PipelineError> {
        let recipient = recipient::Entity::find_by_id(recipient_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(PipelineError::RecipientNotFound)?;

        let now = chrono::Utc::now().naive_utc();
        let pending = check_in::ActiveModel {
            recipient_id: Set(recipient.id),
            status: Set(CheckInStatus::Pending),
            created_at: Set(now),
            ..Default::default()
        };
        let record = pending.insert(self.db.as_ref()).await?;
        crate::metrics::increment_checkins_triggered();

        match self
            .calls
            .place_call(&recipient.phone_number, &self.base_url)
            .await
        {
            Ok(call_sid) => {
                info!(
                    check_in_id = record.id,
                    call_sid = %call_sid,
                    "Check-in call placed"
                );
                let mut active = record.into_active_model();
                active.call_sid = Set(Some(call_sid));
                active.ai_notes = Set(Some("Call initiated, waiting for completion".to_string()));
                Ok(active.update(self.db.as_ref()).await?)
            }
            Err(e) => {
                warn!(check_in_id = record.id, "Call placement failed: {}", e);
                let mut active = record.into_active_model();
                active.status = Set(CheckInStatus::NoAnswer);
                active.ai_notes = Set(Some(format!("Call placement failed: {}", e)));
                active.completed_at = Set(Some(chrono::Utc::now().naive_utc()));
                let record = active.update(self.db.as_ref()).await?;
                crate::metrics::increment_checkins_completed(CheckInStatus::NoAnswer.as_str());
                Ok(record)
            }
        }
    }

    /// O(1) webhook correlation via the unique call_sid index. `None` for
    /// calls this system never placed; orphan callbacks are expected.
    pub async fn find_by_call_sid(
        &self,
        call_sid: &str,
    ) -> Result<Option<check_in::Model>, sea_orm::DbErr> {
        check_in::Entity::find()
            .filter(check_in::Column::CallSid.eq(call_sid))
            .one(self.db.as_ref())
            .await
    }

    /// Voice-webhook path: the call was answered and the provider needs the
    /// text to read aloud. Every failure degrades to the generic fallback
    /// script, since the line is live and returning nothing is not an option.
    pub async fn answer_script(&self, call_sid: &str) -> String {
        let current_date = chrono::Utc::now().format("%A, %B %d").to_string();

        let record = match self.find_by_call_sid(call_sid).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                warn!(call_sid, "Voice webhook for unknown call");
                return scripts::fallback_script(&current_date);
            }
            Err(e) => {
                error!(call_sid, "Voice webhook lookup failed: {}", e);
                return scripts::fallback_script(&current_date);
            }
        };

        let recipient = match recipient::Entity::find_by_id(record.recipient_id)
            .one(self.db.as_ref())
            .await
        {
            Ok(Some(r)) => r,
            _ => {
                warn!(check_in_id = record.id, "Recipient missing for voice webhook");
                return scripts::fallback_script(&current_date);
            }
        };

        let caregiver = user::Entity::find_by_id(recipient.user_id)
            .one(self.db.as_ref())
            .await
            .ok()
            .flatten();

        let script = self
            .scripts
            .generate_script(&recipient, caregiver.as_ref().map(|u| u.name.as_str()))
            .await;

        // Best-effort audit copy of what was actually spoken.
        let mut active = record.into_active_model();
        active.script = Set(Some(script.clone()));
        if let Err(e) = active.update(self.db.as_ref()).await {
            warn!("Failed to store call script: {}", e);
        }

        script
    }

    /// The decisive step, invoked by the provider's final status callback.
    /// Duplicate deliveries and unknown call SIDs are silent no-ops. The
    /// terminal write is a single conditional UPDATE guarded on PENDING, so
    /// a concurrent duplicate can never fire the side effects twice. A
    /// `DbErr` propagates so the ingress answers 500 and the provider
    /// redelivers.
    pub async fn on_terminal_callback(
        &self,
        call_sid: &str,
        answered_by: Option<&str>,
        duration_secs: i64,
    ) -> Result<(), sea_orm::DbErr> {
        let Some(record) = self.find_by_call_sid(call_sid).await? else {
            info!(call_sid, "Status callback for a call we do not manage, ignoring");
            return Ok(());
        };

        if record.status.is_terminal() {
            info!(check_in_id = record.id, "Duplicate status callback, ignoring");
            return Ok(());
        }

        let outcome = classify_outcome(answered_by, duration_secs);
        let note = format!(
            "Call completed: answered_by={}, duration={}s, outcome={}",
            answered_by.unwrap_or("unknown"),
            duration_secs,
            outcome.as_str()
        );
        let now = chrono::Utc::now().naive_utc();

        let result = check_in::Entity::update_many()
            .col_expr(check_in::Column::Status, Expr::value(outcome))
            .col_expr(check_in::Column::CompletedAt, Expr::value(Some(now)))
            .col_expr(check_in::Column::AiNotes, Expr::value(Some(note)))
            .filter(check_in::Column::Id.eq(record.id))
            .filter(check_in::Column::Status.eq(CheckInStatus::Pending))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            info!(
                check_in_id = record.id,
                "Terminal status already written concurrently, skipping side effects"
            );
            return Ok(());
        }

        info!(
            check_in_id = record.id,
            outcome = outcome.as_str(),
            "Check-in completed"
        );
        crate::metrics::increment_checkins_completed(outcome.as_str());

        if outcome == CheckInStatus::NoAnswer {
            // Fire-and-forget relative to the state transition: a delivery
            // failure is logged but never re-raised or retried here.
            match recipient::Entity::find_by_id(record.recipient_id)
                .one(self.db.as_ref())
                .await
            {
                Ok(Some(recipient)) => {
                    let message = self.scripts.generate_concern_sms(&recipient).await;
                    if let Err(e) = self.notifier.notify_missed(&recipient, &message).await {
                        warn!(check_in_id = record.id, "Concern notification failed: {}", e);
                    }
                }
                Ok(None) => {
                    warn!(check_in_id = record.id, "Recipient gone, cannot notify");
                }
                Err(e) => {
                    warn!(check_in_id = record.id, "Recipient lookup for notify failed: {}", e);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::CallError;
    use crate::gemini::GeminiClient;
    use async_trait::async_trait;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubPlacer {
        result: Result<&'static str, CallError>,
    }

    #[async_trait]
    impl CallPlacer for StubPlacer {
        async fn place_call(&self, _to: &str, _base: &str) -> Result<String, CallError> {
            match &self.result {
                Ok(sid) => Ok(sid.to_string()),
                Err(CallError::InvalidDestination(m)) => {
                    Err(CallError::InvalidDestination(m.clone()))
                }
                Err(CallError::Denied(m)) => Err(CallError::Denied(m.clone())),
                Err(CallError::Transient(m)) => Err(CallError::Transient(m.clone())),
            }
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        sends: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ConcernNotifier for CountingNotifier {
        async fn notify_missed(
            &self,
            _recipient: &recipient::Model,
            _message: &str,
        ) -> Result<(), String> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("simulated delivery failure".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn recipient_fixture() -> recipient::Model {
        let now = chrono::Utc::now().naive_utc();
        recipient::Model {
            id: 1,
            user_id: 1,
            name: "Edna".to_string(),
            phone_number: "+15550100100".to_string(),
            condition: "diabetes".to_string(),
            preferred_time: "09:00".to_string(),
            emergency_contact_name: None,
            emergency_contact_phone: None,
            emergency_contact_email: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn check_in_fixture(status: CheckInStatus, call_sid: Option<&str>) -> check_in::Model {
        let now = chrono::Utc::now().naive_utc();
        check_in::Model {
            id: 7,
            recipient_id: 1,
            status,
            call_sid: call_sid.map(|s| s.to_string()),
            script: None,
            transcript: None,
            ai_notes: None,
            created_at: now,
            completed_at: if status.is_terminal() { Some(now) } else { None },
        }
    }

    fn pipeline(
        db: DatabaseConnection,
        placer: StubPlacer,
        notifier: Arc<CountingNotifier>,
    ) -> CheckInPipeline {
        std::env::remove_var("GEMINI_API_KEY");
        CheckInPipeline::new(
            Arc::new(db),
            Arc::new(placer),
            notifier,
            ScriptGenerator::new(GeminiClient::new()),
            "https://carecall.test".to_string(),
        )
    }

    #[test]
    fn pipeline_handles_are_cheaply_cloneable() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<CheckInPipeline>();
    }

    #[test]
    fn classification_table() {
        assert_eq!(
            classify_outcome(Some("no-answer"), 30),
            CheckInStatus::NoAnswer
        );
        assert_eq!(classify_outcome(Some("human"), 3), CheckInStatus::NoAnswer);
        assert_eq!(classify_outcome(Some("human"), 45), CheckInStatus::Ok);
        assert_eq!(
            classify_outcome(Some("machine_start"), 120),
            CheckInStatus::NoAnswer
        );
        assert_eq!(
            classify_outcome(Some("simulated-human"), 45),
            CheckInStatus::Ok
        );
        assert_eq!(classify_outcome(None, 45), CheckInStatus::NoAnswer);
    }

    #[tokio::test]
    async fn trigger_stores_call_sid_on_success() {
        let placed = check_in_fixture(CheckInStatus::Pending, Some("CA123"));
        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([vec![recipient_fixture()]])
            .append_query_results([
                vec![check_in_fixture(CheckInStatus::Pending, None)],
                vec![placed.clone()],
            ])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 7,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 7,
                    rows_affected: 1,
                },
            ])
            .into_connection();

        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = pipeline(
            db,
            StubPlacer {
                result: Ok("CA123"),
            },
            notifier.clone(),
        );

        let record = pipeline.trigger(1).await.unwrap();
        assert_eq!(record.status, CheckInStatus::Pending);
        assert_eq!(record.call_sid.as_deref(), Some("CA123"));
        assert!(record.completed_at.is_none());
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn trigger_resolves_placement_failure_as_no_answer() {
        let failed = check_in_fixture(CheckInStatus::NoAnswer, None);
        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([vec![recipient_fixture()]])
            .append_query_results([
                vec![check_in_fixture(CheckInStatus::Pending, None)],
                vec![failed],
            ])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 7,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 7,
                    rows_affected: 1,
                },
            ])
            .into_connection();

        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = pipeline(
            db,
            StubPlacer {
                result: Err(CallError::InvalidDestination("bad number".to_string())),
            },
            notifier.clone(),
        );

        let record = pipeline.trigger(1).await.unwrap();
        assert_eq!(record.status, CheckInStatus::NoAnswer);
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn trigger_unknown_recipient_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([Vec::<recipient::Model>::new()])
            .into_connection();

        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = pipeline(
            db,
            StubPlacer {
                result: Ok("CA123"),
            },
            notifier,
        );

        assert!(matches!(
            pipeline.trigger(99).await,
            Err(PipelineError::RecipientNotFound)
        ));
    }

    #[tokio::test]
    async fn no_answer_outcome_sends_exactly_one_notification() {
        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([vec![check_in_fixture(CheckInStatus::Pending, Some("CA1"))]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .append_query_results([vec![recipient_fixture()]])
            // Second delivery of the same callback sees a terminal record.
            .append_query_results([vec![check_in_fixture(CheckInStatus::NoAnswer, Some("CA1"))]])
            .into_connection();

        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = pipeline(
            db,
            StubPlacer {
                result: Ok("CA1"),
            },
            notifier.clone(),
        );

        pipeline
            .on_terminal_callback("CA1", Some("no-answer"), 30)
            .await
            .unwrap();
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 1);

        // Idempotence: the retried webhook is a no-op.
        pipeline
            .on_terminal_callback("CA1", Some("no-answer"), 30)
            .await
            .unwrap();
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ok_outcome_sends_no_notification() {
        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([vec![check_in_fixture(CheckInStatus::Pending, Some("CA2"))]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = pipeline(
            db,
            StubPlacer {
                result: Ok("CA2"),
            },
            notifier.clone(),
        );

        pipeline
            .on_terminal_callback("CA2", Some("human"), 45)
            .await
            .unwrap();
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_call_sid_is_a_silent_no_op() {
        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([Vec::<check_in::Model>::new()])
            .into_connection();

        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = pipeline(
            db,
            StubPlacer {
                result: Ok("CA3"),
            },
            notifier.clone(),
        );

        pipeline
            .on_terminal_callback("CAnope", Some("human"), 45)
            .await
            .unwrap();
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lost_conditional_update_skips_side_effects() {
        // Both readers saw PENDING, the other writer won the UPDATE.
        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([vec![check_in_fixture(CheckInStatus::Pending, Some("CA4"))]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = pipeline(
            db,
            StubPlacer {
                result: Ok("CA4"),
            },
            notifier.clone(),
        );

        pipeline
            .on_terminal_callback("CA4", Some("no-answer"), 0)
            .await
            .unwrap();
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn notification_failure_never_surfaces() {
        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([vec![check_in_fixture(CheckInStatus::Pending, Some("CA5"))]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .append_query_results([vec![recipient_fixture()]])
            .into_connection();

        let notifier = Arc::new(CountingNotifier {
            sends: AtomicUsize::new(0),
            fail: true,
        });
        let pipeline = pipeline(
            db,
            StubPlacer {
                result: Ok("CA5"),
            },
            notifier.clone(),
        );

        // The delivery failure is swallowed; the callback still succeeds.
        pipeline
            .on_terminal_callback("CA5", Some("machine_start"), 120)
            .await
            .unwrap();
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 1);
    }
}
