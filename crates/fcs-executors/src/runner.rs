//! Test case runner: executes a run's test cases, or a consent component,
//! on a background task.

use std::sync::Arc;

use fcs_model::{
    CONSENT_URL, Context, DetailError, SIGNING_KEY, SchemaValidator, SigningKey,
    SpecificationTestCases, TestCase, TestCasesRun,
};
use fcs_telemetry::redact_headers;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::client::Executor;
use crate::component::Component;
use crate::config::{RunConfig, TokenAcquisition};
use crate::consent::TokenConsentIdItem;
use crate::controller::DaemonController;
use crate::error::RunnerError;
use crate::results::{Metrics, TestResult};

/// Context key seeded with the token name the consent id is stored under.
pub const CONSENT_ID: &str = "consent_id";
pub const TOKEN_NAME: &str = "token_name";
pub const PERMISSION_LIST: &str = "permission_list";
/// Client credentials token produced by a consent component.
pub const CLIENT_ACCESS_TOKEN: &str = "client_access_token";

/// Everything needed to run a set of test cases.
#[derive(Debug, Clone, Default)]
pub struct RunDefinition {
    pub test_case_run: TestCasesRun,
    /// Client assertion signing key, seeded into every rule context.
    pub signing_key: Option<SigningKey>,
    pub config: RunConfig,
}

impl RunDefinition {
    #[must_use]
    pub fn new(test_case_run: TestCasesRun) -> Self {
        Self {
            test_case_run,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }
}

/// Clears the running flag when the run ends, however it ends.
struct RunningGuard {
    running: Arc<Mutex<bool>>,
}

impl RunningGuard {
    fn acquire(running: &Arc<Mutex<bool>>, label: &'static str) -> Result<Self, RunnerError> {
        let mut flag = running.lock();
        if *flag {
            return Err(RunnerError::AlreadyRunning(label));
        }
        *flag = true;
        Ok(Self {
            running: Arc::clone(running),
        })
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        *self.running.lock() = false;
    }
}

/// Runs test cases sequentially against one executor.
///
/// A runner refuses to start while a previous start is still in progress.
#[derive(Clone)]
pub struct TestCaseRunner {
    executor: Arc<dyn Executor>,
    definition: Arc<RunDefinition>,
    controller: Arc<dyn DaemonController>,
    schema: Option<Arc<dyn SchemaValidator>>,
    running: Arc<Mutex<bool>>,
    label: &'static str,
}

impl std::fmt::Debug for TestCaseRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCaseRunner")
            .field("label", &self.label)
            .field("running", &*self.running.lock())
            .field("test_cases", &self.definition.test_case_run.len())
            .finish_non_exhaustive()
    }
}

impl TestCaseRunner {
    /// A runner for the main suite.
    #[must_use]
    pub fn new(
        executor: Arc<dyn Executor>,
        definition: Arc<RunDefinition>,
        controller: Arc<dyn DaemonController>,
    ) -> Self {
        Self {
            executor,
            definition,
            controller,
            schema: None,
            running: Arc::new(Mutex::new(false)),
            label: "test cases",
        }
    }

    /// A runner for one consent acquisition flow.
    #[must_use]
    pub fn consent_acquisition(
        executor: Arc<dyn Executor>,
        definition: Arc<RunDefinition>,
        controller: Arc<dyn DaemonController>,
    ) -> Self {
        Self {
            label: "consent acquisition",
            ..Self::new(executor, definition, controller)
        }
    }

    /// Validate responses against `validator` when a test asks for schema validation.
    #[must_use]
    pub fn with_schema_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.schema = Some(validator);
        self
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.running.lock()
    }

    /// Start the run on a background task.
    ///
    /// The task walks every specification in order, checks the stop flag
    /// before each test case, reports each result to the controller and
    /// marks the controller completed. It resolves to the final rule
    /// context, including values later tests put there.
    ///
    /// # Errors
    ///
    /// [`RunnerError::AlreadyRunning`] if a run is in progress.
    pub fn run_test_cases(&self, ctx: &Context) -> Result<JoinHandle<Context>, RunnerError> {
        let guard = RunningGuard::acquire(&self.running, self.label)?;
        let runner = self.clone();
        let rule_ctx = self.make_rule_ctx(ctx);
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, test_cases = self.definition.test_case_run.len(), "starting test case run");

        Ok(tokio::spawn(
            async move {
                let _guard = guard;
                runner.run_test_cases_async(rule_ctx).await
            }
            .instrument(tracing::info_span!("test_case_run", %run_id)),
        ))
    }

    async fn run_test_cases_async(&self, mut rule_ctx: Context) -> Context {
        for spec in &self.definition.test_case_run.test_cases {
            if !self.execute_spec_tests(spec, &mut rule_ctx).await {
                break;
            }
        }
        self.controller.set_completed();
        rule_ctx
    }

    /// Returns false when a stop was requested.
    async fn execute_spec_tests(&self, spec: &SpecificationTestCases, rule_ctx: &mut Context) -> bool {
        let span = tracing::debug_span!("spec", spec = %spec.specification.name);
        let redact_fields = self.definition.config.telemetry.all_redact_fields();
        async {
            for tc in &spec.test_cases {
                if self.controller.should_stop() {
                    tracing::info!("stop test run received, aborting runner");
                    return false;
                }
                rule_ctx.dump(&redact_fields);
                let result = self.execute_test(tc, rule_ctx).await;
                self.controller.add_result(result);
            }
            true
        }
        .instrument(span)
        .await
    }

    /// Prepare, execute and validate one test case.
    ///
    /// Preparation and transport errors short-circuit into a failed result
    /// with that single error.
    pub async fn execute_test(&self, tc: &TestCase, rule_ctx: &mut Context) -> TestResult {
        let request = match tc.prepare(rule_ctx) {
            Ok(request) => request,
            Err(err) => {
                tracing::error!(test_case_id = %tc.id, error = %err, "preparing test case");
                tc.dump();
                return TestResult::failed(tc, Metrics::default(), vec![DetailError::general(err)]);
            }
        };
        tracing::debug!(
            test_case_id = %tc.id,
            method = %request.method,
            path = %request.path(),
            headers = ?redact_headers(
                &request.headers,
                &self.definition.config.telemetry.all_redact_fields()
            ),
            "executing test case"
        );

        let (response, metrics) = match self.executor.execute(&request).await {
            Ok(exchange) => exchange,
            Err(err) => {
                tracing::error!(test_case_id = %tc.id, error = %err, result = "FAIL", "test result");
                return TestResult::failed(tc, Metrics::default(), vec![DetailError::general(err)]);
            }
        };

        let (pass, details) = tc.validate_with(&response, rule_ctx, self.schema.as_deref());
        if pass {
            tracing::info!(
                test_case_id = %tc.id,
                name = %tc.name,
                response_time_ms = metrics.response_time_ms(),
                response_size = metrics.response_size,
                result = "PASS",
                "test result"
            );
            TestResult::passed(tc, metrics)
        } else {
            tracing::error!(
                test_case_id = %tc.id,
                name = %tc.name,
                status = response.status,
                expected_status = tc.expect.status_code,
                failures = details.len(),
                result = "FAIL",
                "test result"
            );
            tc.dump();
            TestResult::failed(tc, metrics, details)
        }
    }

    /// Start a consent flow for `item` on a background task.
    ///
    /// The component for `mode` is loaded, seeded and checked before this
    /// returns. The flow sends exactly one item on `tx`, without blocking:
    /// the consent id (stored under the token name) and consent URL when
    /// every step passed, otherwise the first failure.
    ///
    /// # Errors
    ///
    /// [`RunnerError::AlreadyRunning`], or a component that cannot be
    /// loaded or lacks parameters in `ctx`.
    pub fn run_consent_acquisition(
        &self,
        item: TokenConsentIdItem,
        ctx: &Context,
        mode: TokenAcquisition,
        tx: mpsc::Sender<TokenConsentIdItem>,
    ) -> Result<JoinHandle<()>, RunnerError> {
        let guard = RunningGuard::acquire(&self.running, self.label)?;
        tracing::trace!(
            token_name = %item.token_name,
            permissions = %item.permissions,
            %mode,
            "starting consent acquisition"
        );

        let mut rule_ctx = self.make_rule_ctx(ctx);
        rule_ctx.put_string(CONSENT_ID, item.token_name.clone());
        rule_ctx.put_string(TOKEN_NAME, item.token_name.clone());
        rule_ctx.put_string(PERMISSION_LIST, item.permissions.clone());

        let component = Component::load(mode)?;
        component.validate_parameters(&rule_ctx)?;
        let component = component.with_replacements(&rule_ctx)?;

        let runner = self.clone();
        let span = tracing::info_span!(
            "consent_flow",
            component = %component.name,
            token_name = %item.token_name
        );
        Ok(tokio::spawn(
            async move {
                let _guard = guard;
                let item = runner.execute_component_tests(&component, rule_ctx, item).await;
                send_item(&tx, item);
            }
            .instrument(span),
        ))
    }

    async fn execute_component_tests(
        &self,
        component: &Component,
        mut rule_ctx: Context,
        mut item: TokenConsentIdItem,
    ) -> TokenConsentIdItem {
        for tc in &component.tests {
            if self.controller.should_stop() {
                tracing::debug!("stop component test run received, aborting runner");
                item.error = "consent acquisition stopped".to_string();
                return item;
            }
            let result = self.execute_test(tc, &mut rule_ctx).await;
            let failure = (!result.pass).then(|| {
                let message = result.first_error().unwrap_or("step failed");
                format!("{} {}: {message}", component.name, tc.name)
            });
            self.controller.add_result(result);
            if let Some(failure) = failure {
                item.error = failure;
                return item;
            }
        }

        if let Ok(url) = rule_ctx.get_string(CONSENT_URL) {
            item.consent_url = url.to_string();
        }
        match rule_ctx.get_string(&item.token_name) {
            Ok(consent_id) => item.consent_id = consent_id.to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "did not find consent id in context for token");
            }
        }
        if let Ok(token) = rule_ctx.get_string(CLIENT_ACCESS_TOKEN) {
            item.client_access_token = token.to_string();
        }
        item
    }

    /// A private context: the signing key, then everything in `ctx`.
    fn make_rule_ctx(&self, ctx: &Context) -> Context {
        let mut rule_ctx = Context::new();
        if let Some(key) = &self.definition.signing_key {
            rule_ctx.put_opaque(SIGNING_KEY, key.clone());
        }
        rule_ctx.put_context(ctx);
        rule_ctx
    }
}

fn send_item(tx: &mpsc::Sender<TokenConsentIdItem>, item: TokenConsentIdItem) {
    tracing::debug!(token_name = %item.token_name, failed = !item.error.is_empty(), "sending consent item");
    match tx.try_send(item) {
        Ok(()) => {}
        Err(TrySendError::Full(item)) => {
            tracing::warn!(token_name = %item.token_name, "consent channel full, dropping item");
        }
        Err(TrySendError::Closed(item)) => {
            tracing::warn!(token_name = %item.token_name, "consent receiver gone, dropping item");
        }
    }
}
