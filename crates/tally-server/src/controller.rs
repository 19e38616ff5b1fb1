//! Per-request dispatch from a validated [`Request`] to one action.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use metrics::{counter, histogram};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use tally_core::{Activity, NewActivity};
use tally_store::{StartOutcome, StopOutcome, Storage, StoreError};

use crate::error::RpcError;
use crate::request::{self, Method, Request};
use crate::response::Response;

type Action<S> = fn(&Controller<S>) -> Result<Value, RpcError>;

/// Runs exactly one action for one request and records its outcome.
pub struct Controller<S: Storage> {
    request: Request,
    response: Response,
    storage: S,
}

impl<S: Storage> Controller<S> {
    /// Controller with a response that echoes the request id.
    pub fn new(request: Request, storage: S) -> Self {
        let response = Response::new(request.identifier().cloned());
        Self {
            request,
            response,
            storage,
        }
    }

    /// The request being handled.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The response built so far.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Request-scoped storage handle.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Consume the controller after [`Controller::dispatch`].
    pub fn into_response(self) -> Response {
        self.response
    }

    /// Validate, route and run the request. Never panics and always leaves
    /// exactly one of result or error set on the response.
    pub fn dispatch(&mut self) {
        if let Some(violation) = self.request.violation() {
            warn!(%violation, "rejecting invalid request");
            counter!("rpc_errors_total", "method" => "invalid", "error_type" => "INVALID_REQUEST")
                .increment(1);
            self.reject();
            return;
        }

        let Some(method) = self.request.method() else {
            self.reject();
            return;
        };
        counter!("rpc_requests_total", "method" => method.as_str()).increment(1);

        let Some(action) = Self::action(method) else {
            counter!("rpc_errors_total", "method" => method.as_str(), "error_type" => "METHOD_NOT_FOUND")
                .increment(1);
            self.response.set_error(RpcError::method_not_found(method.as_str()));
            return;
        };

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| action(self)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!(method = method.as_str(), %message, "action panicked");
                Err(RpcError::server_error(format!("Error: {message:?}")))
            });
        histogram!("rpc_request_duration_seconds", "method" => method.as_str())
            .record(start.elapsed().as_secs_f64());

        match outcome {
            Ok(result) => {
                debug!(method = method.as_str(), "request handled");
                self.response.set_result(result);
            }
            Err(err) => {
                counter!("rpc_errors_total", "method" => method.as_str(), "error_type" => err.code.as_str())
                    .increment(1);
                self.response.set_error(err);
            }
        }
    }

    /// An invalid request has no trustworthy id, so none is echoed.
    fn reject(&mut self) {
        self.response = Response::new(None);
        self.response.set_error(RpcError::invalid_request());
    }

    fn action(method: Method) -> Option<Action<S>> {
        match method {
            Method::Info | Method::Status => Some(Self::action_info),
            Method::Start => Some(Self::action_start),
            Method::Stop => Some(Self::action_stop),
            Method::ProjectSelect => Some(Self::action_project_select),
            Method::ActivityInsert
            | Method::ActivityRemove
            | Method::ActivitySelect
            | Method::ActivityUpdate
            | Method::ProjectInsert
            | Method::ProjectRemove
            | Method::ProjectUpdate => None,
        }
    }

    fn action_info(&self) -> Result<Value, RpcError> {
        match self.storage.running_activity() {
            Ok(None) => Ok(json!({"message": "There is no running activity."})),
            Ok(Some(activity)) => Ok(json!({
                "message": "There is a running activity.",
                "activity": activity_value(&activity)?,
            })),
            Err(e) => Err(storage_error("Reading running activity failed!", &e)),
        }
    }

    fn action_start(&self) -> Result<Value, RpcError> {
        let params = self.request.params();
        let project_id = request::optional_i64(params, "ProjectId").unwrap_or(0);
        let name = request::optional_str(params, "Name").unwrap_or_default();
        if name.is_empty() || project_id == 0 {
            return Err(RpcError::invalid_params(
                "Activity was not started - wrong parameters given!",
            ));
        }

        let mut draft = NewActivity::new(project_id, name);
        if let Some(description) = request::optional_str(params, "Description") {
            draft = draft.with_description(description);
        }
        if let Some(tags) = request::optional_str(params, "Tags") {
            draft = draft.with_tags(tags);
        }

        match self.storage.start_activity(draft) {
            StartOutcome::Started(activity) => Ok(json!({
                "message": "Activity was successfully started!",
                "activity": activity_value(&activity)?,
            })),
            StartOutcome::AlreadyRunning => Ok(json!({
                "message": "Activity was not started - another activity is running.",
            })),
            StartOutcome::Failed(e) => Err(storage_error("Starting activity failed!", &e)),
        }
    }

    fn action_stop(&self) -> Result<Value, RpcError> {
        match self.storage.stop_activity() {
            StopOutcome::Stopped(activity) => Ok(json!({
                "message": "Activity was successfully stopped!",
                "activity": activity_value(&activity)?,
            })),
            StopOutcome::NotRunning => Ok(json!({
                "message": "Couldn't stop activity - no activity is running.",
            })),
            StopOutcome::Failed(e) => Err(storage_error("Stopping activity failed!", &e)),
        }
    }

    fn action_project_select(&self) -> Result<Value, RpcError> {
        let projects = self
            .storage
            .select_project(self.request.params())
            .map_err(|e| storage_error("Selecting projects failed!", &e))?;
        let projects = serde_json::to_value(projects)
            .map_err(|e| RpcError::server_error(format!("Error: {e}")))?;
        Ok(json!({"project": projects}))
    }
}

fn activity_value(activity: &Activity) -> Result<Value, RpcError> {
    serde_json::to_value(activity).map_err(|e| RpcError::server_error(format!("Error: {e}")))
}

fn storage_error(message: &str, err: &StoreError) -> RpcError {
    error!(error = %err, "{message}");
    RpcError::server_error(message).with_data(Value::String(err.to_string()))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use mockall::mock;
    use tally_core::{NewProject, Project};
    use tally_store::{Database, SqliteStorage};

    mock! {
        Store {}

        impl Storage for Store {
            fn schema_version(&self) -> Result<u32, StoreError>;
            fn create_schema(&self) -> Result<(), StoreError>;
            fn empty_storage(&self) -> Result<(), StoreError>;
            fn running_activity(&self) -> Result<Option<Activity>, StoreError>;
            fn start_activity(&self, draft: NewActivity) -> StartOutcome;
            fn stop_activity(&self) -> StopOutcome;
            fn update_activity(&self, activity: &Activity) -> Result<Activity, StoreError>;
            fn insert_project(&self, draft: NewProject) -> Result<Project, StoreError>;
            fn update_project(&self, project: &Project) -> Result<Project, StoreError>;
            fn select_activity(&self, filter: &Value) -> Result<Vec<Activity>, StoreError>;
            fn select_project(&self, filter: &Value) -> Result<Vec<Project>, StoreError>;
            fn remove_activity(&self, filter: &Value, options: &Value) -> Result<usize, StoreError>;
            fn remove_project(&self, filter: &Value, options: &Value) -> Result<usize, StoreError>;
        }
    }

    fn storage() -> SqliteStorage {
        let storage = SqliteStorage::new(Database::in_memory().unwrap());
        storage.create_schema().unwrap();
        storage
    }

    fn run<S: Storage>(storage: S, body: Value) -> Value {
        let mut controller = Controller::new(Request::from_slice(body.to_string().as_bytes()), storage);
        controller.dispatch();
        serde_json::to_value(controller.into_response()).unwrap()
    }

    fn call(storage: &SqliteStorage, method: &str, params: Value) -> Value {
        run(
            storage.clone(),
            json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1}),
        )
    }

    #[test]
    fn info_on_empty_storage() {
        let resp = run(storage(), json!({"jsonrpc": "2.0", "method": "Info", "id": 1}));
        assert_eq!(
            resp,
            json!({"jsonrpc": "2.0", "id": 1, "result": {"message": "There is no running activity."}})
        );
    }

    #[test]
    fn wrong_protocol_version() {
        let resp = run(storage(), json!({"jsonrpc": "1.0", "method": "Info", "id": 1}));
        assert_eq!(
            resp,
            json!({"jsonrpc": "2.0", "error": {"code": 32600, "message": "Request is not valid!"}})
        );
    }

    #[test]
    fn invalid_requests_never_echo_id() {
        for body in [
            json!({"jsonrpc": "1.0", "method": "Start", "id": 7}),
            json!({"jsonrpc": "2.0", "method": "Delete", "id": "abc"}),
            json!({"jsonrpc": "2.0", "id": 3}),
        ] {
            let resp = run(storage(), body);
            assert!(resp.get("id").is_none(), "{resp}");
            assert_eq!(resp["error"]["code"], 32600);
        }
    }

    #[test]
    fn known_errors_echo_id() {
        let storage = storage();
        let resp = run(storage.clone(), json!({"method": "ProjectInsert", "id": 11}));
        assert_eq!(resp["id"], 11);
        assert_eq!(resp["error"]["code"], 32601);

        let resp = run(storage, json!({"method": "Start", "params": {"Name": ""}, "id": 12}));
        assert_eq!(resp["id"], 12);
        assert_eq!(resp["error"]["code"], 32602);
    }

    #[test]
    fn start_on_empty_storage() {
        let storage = storage();
        let resp = call(&storage, "Start", json!({"ProjectId": 1, "Name": "Test"}));
        let result = &resp["result"];
        assert_eq!(result["message"], "Activity was successfully started!");
        assert!(result["activity"]["ActivityId"].as_i64().unwrap() > 0);
        assert!(result["activity"]["Stopped"].is_null());
        assert_eq!(result["activity"]["ProjectId"], 1);
        assert_eq!(result["activity"]["Name"], "Test");
        assert!(storage.is_running_activity().unwrap());
    }

    #[test]
    fn start_accepts_float_project_id() {
        let storage = storage();
        let resp = call(&storage, "Start", json!({"ProjectId": 3.0, "Name": "Float"}));
        assert_eq!(resp["result"]["message"], "Activity was successfully started!");
        assert_eq!(resp["result"]["activity"]["ProjectId"], 3);

        let resp = call(&self::storage(), "Start", json!({"ProjectId": 0.5, "Name": "Zero"}));
        assert_eq!(resp["error"]["code"], 32602);
    }

    #[test]
    fn start_keeps_description_and_tags() {
        let storage = storage();
        let _ = call(
            &storage,
            "Start",
            json!({"ProjectId": 2, "Name": "Docs", "Description": "Write docs", "Tags": "a,b"}),
        );
        let running = storage.running_activity().unwrap().unwrap();
        assert_eq!(running.project_id, 2);
        assert_eq!(running.description.as_deref(), Some("Write docs"));
        assert_eq!(running.tags.as_deref(), Some("a,b"));
    }

    #[test]
    fn start_while_running() {
        let storage = storage();
        let _ = call(&storage, "Start", json!({"ProjectId": 1, "Name": "First"}));
        let resp = call(&storage, "Start", json!({"ProjectId": 1, "Name": "Second"}));
        assert_eq!(
            resp["result"]["message"],
            "Activity was not started - another activity is running."
        );
        assert!(resp["result"].get("activity").is_none());
        assert_eq!(storage.activities().count().unwrap(), 1);
    }

    #[test]
    fn start_with_wrong_params() {
        let storage = storage();
        for params in [
            json!({"ProjectId": 1}),
            json!({"Name": "Test"}),
            json!({"ProjectId": 0, "Name": "Test"}),
            json!({"ProjectId": 1, "Name": ""}),
            Value::Null,
        ] {
            let resp = call(&storage, "Start", params);
            assert_eq!(resp["error"]["code"], 32602);
            assert_eq!(
                resp["error"]["message"],
                "Activity was not started - wrong parameters given!"
            );
        }
        assert!(!storage.is_running_activity().unwrap());
    }

    #[test]
    fn stop_without_running_activity() {
        let resp = call(&storage(), "Stop", Value::Null);
        assert_eq!(
            resp["result"]["message"],
            "Couldn't stop activity - no activity is running."
        );
    }

    #[test]
    fn stop_after_start() {
        let storage = storage();
        let started = call(&storage, "Start", json!({"ProjectId": 1, "Name": "Test"}));
        let resp = call(&storage, "Stop", Value::Null);
        assert_eq!(resp["result"]["message"], "Activity was successfully stopped!");

        let before: Activity = serde_json::from_value(started["result"]["activity"].clone()).unwrap();
        let after: Activity = serde_json::from_value(resp["result"]["activity"].clone()).unwrap();
        let stopped = after.stopped.unwrap();
        assert!(stopped > after.started);
        assert_eq!(after.activity_id, before.activity_id);
        assert_eq!(after.started, before.started);
        assert_eq!(after.name, before.name);
        assert!(!storage.is_running_activity().unwrap());
    }

    #[test]
    fn info_and_status_report_running_activity() {
        let storage = storage();
        let _ = call(&storage, "Start", json!({"ProjectId": 1, "Name": "Test"}));
        for method in ["Info", "Status"] {
            let resp = call(&storage, method, Value::Null);
            assert_eq!(resp["result"]["message"], "There is a running activity.");
            assert_eq!(resp["result"]["activity"]["Name"], "Test");
        }
    }

    #[test]
    fn project_select_returns_empty_collection() {
        let resp = call(&storage(), "ProjectSelect", json!({"Name": "x"}));
        assert_eq!(resp["result"], json!({"project": []}));
    }

    #[test]
    fn unimplemented_methods_are_not_found() {
        for method in ["ActivityInsert", "ProjectUpdate", "ProjectRemove"] {
            let resp = call(&storage(), method, Value::Null);
            assert_eq!(resp["error"]["code"], 32601);
            assert_eq!(
                resp["error"]["message"],
                format!("Method '{method}' is not implemented!")
            );
            assert_eq!(resp["id"], 1);
        }
    }

    #[test]
    fn invalid_request_never_touches_storage() {
        // No expectations: any storage call fails the test.
        let store = MockStore::new();
        let resp = run(store, json!({"jsonrpc": "2.0", "method": "Unknown"}));
        assert_eq!(resp["error"]["code"], 32600);

        let resp = run(MockStore::new(), json!("just a string"));
        assert_eq!(resp["error"]["code"], 32600);
    }

    #[test]
    fn storage_failure_becomes_server_error() {
        let mut store = MockStore::new();
        store
            .expect_start_activity()
            .times(1)
            .returning(|_| StartOutcome::Failed(StoreError::Database("disk I/O error".into())));
        let resp = run(
            store,
            json!({"method": "Start", "params": {"ProjectId": 1, "Name": "Test"}, "id": 5}),
        );
        assert_eq!(resp["id"], 5);
        assert_eq!(resp["error"]["code"], 32000);
        assert_eq!(resp["error"]["message"], "Starting activity failed!");
        assert_eq!(resp["error"]["data"], "database error: disk I/O error");
    }

    #[test]
    fn stop_failure_becomes_server_error() {
        let mut store = MockStore::new();
        store
            .expect_stop_activity()
            .returning(|| StopOutcome::Failed(StoreError::NotFound("activity 3".into())));
        let resp = run(store, json!({"method": "Stop"}));
        assert_eq!(resp["error"]["message"], "Stopping activity failed!");
    }

    /// Storage whose every call panics.
    struct PanickingStore;

    impl Storage for PanickingStore {
        fn schema_version(&self) -> Result<u32, StoreError> {
            panic!("boom")
        }
        fn create_schema(&self) -> Result<(), StoreError> {
            panic!("boom")
        }
        fn empty_storage(&self) -> Result<(), StoreError> {
            panic!("boom")
        }
        fn running_activity(&self) -> Result<Option<Activity>, StoreError> {
            panic!("boom")
        }
        fn start_activity(&self, _draft: NewActivity) -> StartOutcome {
            panic!("boom")
        }
        fn stop_activity(&self) -> StopOutcome {
            panic!("boom")
        }
        fn update_activity(&self, _activity: &Activity) -> Result<Activity, StoreError> {
            panic!("boom")
        }
        fn insert_project(&self, _draft: NewProject) -> Result<Project, StoreError> {
            panic!("boom")
        }
        fn update_project(&self, _project: &Project) -> Result<Project, StoreError> {
            panic!("boom")
        }
        fn select_activity(&self, _filter: &Value) -> Result<Vec<Activity>, StoreError> {
            panic!("boom")
        }
        fn select_project(&self, _filter: &Value) -> Result<Vec<Project>, StoreError> {
            panic!("boom")
        }
        fn remove_activity(&self, _filter: &Value, _options: &Value) -> Result<usize, StoreError> {
            panic!("boom")
        }
        fn remove_project(&self, _filter: &Value, _options: &Value) -> Result<usize, StoreError> {
            panic!("boom")
        }
    }

    #[test]
    fn panics_are_caught() {
        let resp = run(PanickingStore, json!({"method": "Info", "id": 9}));
        assert_eq!(resp["id"], 9);
        assert_eq!(resp["error"]["code"], ErrorCode::ServerError.code());
        assert_eq!(resp["error"]["message"], "Error: \"boom\"");
        assert!(resp.get("result").is_none());
    }

    #[test]
    fn start_passes_draft_to_storage() {
        let mut store = MockStore::new();
        store
            .expect_start_activity()
            .withf(|draft| draft.project_id == 4 && draft.name == "Review" && draft.tags.is_none())
            .returning(|_| StartOutcome::AlreadyRunning);
        let resp = run(store, json!({"method": "Start", "params": {"ProjectId": "4", "Name": "Review"}}));
        assert_eq!(
            resp["result"]["message"],
            "Activity was not started - another activity is running."
        );
    }
}
