//! Typed wrappers over the SOAP transport for OCI lifecycle operations.
//!
//! Every operation builds its argument structure around the resolved
//! client id, delegates to [`SoapTransport::call`], and normalizes the
//! result with the navigation helpers. Returned values stay
//! semi-structured ([`serde_json::Value`]) — the presentation layer picks
//! the fields it renders.

use serde_json::{Value, json};

use crate::error::OktawaveError;
use crate::session::Session;
use crate::soap::{CallOptions, SoapTransport};
use crate::value::{dict_item_name, dict_name, dive, dive_i64, dive_list, dive_str};

// ── Protocol constants (fixed by the legacy contract) ───────────────

/// Object-type dictionary code for machine instances.
pub const OBJECT_TYPE_MACHINE: i64 = 139;
/// Job status code for an in-progress asynchronous operation.
pub const STATUS_IN_PROGRESS: i64 = 135;
/// Operation-type code of the history entry that reveals the initial
/// access password.
pub const OP_TYPE_PASSWORD_REVEAL: i64 = 247;
/// Dictionary id of the OCI class dictionary.
pub const DICTIONARY_OCI_CLASSES: i64 = 12;
/// Connection type selected at creation time.
pub const CONNECTION_TYPE_DEFAULT: i64 = 37;
/// Payment method selected at creation time.
pub const PAYMENT_METHOD_DEFAULT: i64 = 33;
/// History page size used when scanning for the access password.
pub const HISTORY_PAGE_SIZE: i64 = 100;

/// Autoscaler setting for a created instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Autoscaler {
    Off,
    #[default]
    On,
    Notify,
}

impl Autoscaler {
    pub fn type_id(self) -> i64 {
        match self {
            Autoscaler::Off => 187,
            Autoscaler::On => 188,
            Autoscaler::Notify => 235,
        }
    }
}

/// Parameters for `create_virtual_machine`.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub name: String,
    pub template_id: i64,
    pub class_id: Option<i64>,
    pub autoscaler: Autoscaler,
}

/// One entry of the shared asynchronous-operations feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub operation_id: i64,
    pub object_id: i64,
    pub object_type_id: i64,
    pub status_id: i64,
    pub progress: i64,
    pub object_name: String,
    pub operation_label: String,
}

impl Job {
    pub fn from_value(v: &Value) -> Job {
        Job {
            operation_id: dive_i64(v, &["asynchronous_operation_id"]).unwrap_or(0),
            object_id: dive_i64(v, &["object_id"]).unwrap_or(0),
            object_type_id: dive_i64(v, &["object_type_id"]).unwrap_or(0),
            status_id: dive_i64(v, &["status_id"]).unwrap_or(0),
            progress: dive_i64(v, &["progress"]).unwrap_or(0),
            object_name: dive_str(v, &["object_name"]).unwrap_or_default().to_string(),
            operation_label: dive_str(v, &["operation_type_name"])
                .unwrap_or_default()
                .to_string(),
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

pub struct ApiClient {
    transport: SoapTransport,
    session: Session,
    oci_classes: Option<Vec<(i64, String)>>,
}

impl ApiClient {
    pub fn new(api_url: &str, login: &str, password: &str) -> Result<Self, OktawaveError> {
        Ok(ApiClient {
            transport: SoapTransport::new(api_url, login, password)?,
            session: Session::new(login, password),
            oci_classes: None,
        })
    }

    async fn cid(&mut self) -> Result<i64, OktawaveError> {
        self.session.client_id(&mut self.transport).await
    }

    /// Session-aware call: authenticates first, then dispatches.
    async fn call(
        &mut self,
        method: &str,
        args: Value,
        options: CallOptions,
    ) -> Result<Value, OktawaveError> {
        self.session.ensure(&mut self.transport).await?;
        self.transport.call(method, &args, options).await
    }

    /// List the account's instances.
    pub async fn oci_list(&mut self) -> Result<Vec<Value>, OktawaveError> {
        let cid = self.cid().await?;
        let res = self
            .call(
                "get_virtual_machines",
                json!({"searchParams": {"ins0:ClientId": cid}}),
                CallOptions::default(),
            )
            .await?;
        Ok(dive_list(&res, &["_results", "virtual_machine_view"])
            .into_iter()
            .cloned()
            .collect())
    }

    /// Fetch the raw detail record for one instance.
    pub async fn oci_get(&mut self, id: i64) -> Result<Value, OktawaveError> {
        let cid = self.cid().await?;
        self.call(
            "get_virtual_machine_by_id",
            json!({"virtualMachineId": id, "clientId": cid}),
            CallOptions::default(),
        )
        .await
    }

    /// Like [`oci_get`](Self::oci_get), but a record without an instance
    /// id is reported as not-found. The API returns an empty shell rather
    /// than a fault for unknown ids.
    pub async fn get_oci(&mut self, id: i64) -> Result<Value, OktawaveError> {
        let oci = self.oci_get(id).await?;
        if dive(&oci, &["virtual_machine_id"]).is_none() {
            return Err(OktawaveError::OciNotFound { id });
        }
        Ok(oci)
    }

    pub async fn oci_delete(&mut self, id: i64) -> Result<Value, OktawaveError> {
        let cid = self.cid().await?;
        self.call(
            "delete_virtual_machine",
            json!({"virtualMachineId": id, "clientId": cid}),
            CallOptions::default(),
        )
        .await
    }

    pub async fn oci_power_on(&mut self, id: i64) -> Result<Value, OktawaveError> {
        let cid = self.cid().await?;
        self.call(
            "turn_on_virtual_machine",
            json!({"virtualMachineId": id, "clientId": cid}),
            CallOptions::default(),
        )
        .await
    }

    pub async fn oci_power_off(&mut self, id: i64) -> Result<Value, OktawaveError> {
        let cid = self.cid().await?;
        self.call(
            "turnoff_virtual_machine",
            json!({"virtualMachineId": id, "clientId": cid}),
            CallOptions::default(),
        )
        .await
    }

    pub async fn oci_restart(&mut self, id: i64) -> Result<Value, OktawaveError> {
        let cid = self.cid().await?;
        self.call(
            "restart_virtual_machine",
            json!({"virtualMachineId": id, "clientId": cid}),
            CallOptions::default(),
        )
        .await
    }

    /// Scan the instance's recent operation history for the entry that
    /// reveals the initial access password. Absence is normal (the entry
    /// ages out of the history) and maps to `None`, not an error.
    pub async fn oci_password(&mut self, id: i64) -> Result<Option<String>, OktawaveError> {
        let cid = self.cid().await?;
        let res = self
            .call(
                "get_virtual_machine_histories",
                json!({
                    "searchParams": {
                        "ins0:PageSize": HISTORY_PAGE_SIZE,
                        "ins0:VirtualMachineId": id,
                    },
                    "clientId": cid,
                }),
                CallOptions::default(),
            )
            .await?;
        let entries = dive_list(&res, &["_results", "virtual_machine_history"]);
        Ok(password_from_history(&entries))
    }

    /// Submit an instance creation request. The result carries no useful
    /// identity; discovery of the new instance happens through the
    /// asynchronous-operations feed (see `create::CreationPoller`).
    pub async fn oci_create(&mut self, req: &CreateRequest) -> Result<Value, OktawaveError> {
        let cid = self.cid().await?;
        self.call(
            "create_virtual_machine",
            json!({
                "templateId": req.template_id,
                "disks": null,
                "additionalDisks": null,
                "machineName": req.name,
                "selectedClass": req.class_id,
                "selectedContainer": null,
                "selectedConnectionType": CONNECTION_TYPE_DEFAULT,
                "selectedPaymentMethod": PAYMENT_METHOD_DEFAULT,
                "clientId": cid,
                "providervAppClientId": null,
                "vAppType": "Machine",
                "databaseTypeId": null,
                "clientVmParameter": null,
                "autoScalingTypeId": req.autoscaler.type_id(),
            }),
            CallOptions::default(),
        )
        .await
    }

    /// The recent asynchronous-operations feed (sliding window, minutes).
    pub async fn running_jobs(&mut self, period_minutes: i64) -> Result<Vec<Job>, OktawaveError> {
        let cid = self.cid().await?;
        let res = self
            .call(
                "get_asynchronous_operations",
                json!({"clientId": cid, "period": period_minutes}),
                CallOptions::common(),
            )
            .await?;
        Ok(dive_list(&res, &["asynchronous_operation_item"])
            .into_iter()
            .map(Job::from_value)
            .collect())
    }

    /// Resolve an OCI class name ("Small", "Large", ...) to its dictionary
    /// id. The class dictionary is loaded once per client and cached.
    pub async fn oci_class_id(&mut self, name: &str) -> Result<i64, OktawaveError> {
        if self.oci_classes.is_none() {
            let res = self
                .call(
                    "get_dictionary_items",
                    json!({"dictionaryId": DICTIONARY_OCI_CLASSES}),
                    CallOptions::common(),
                )
                .await?;
            let classes = dive_list(&res, &["dictionary_item"])
                .into_iter()
                .map(|c| {
                    (
                        dive_i64(c, &["dictionary_item_id"]).unwrap_or(0),
                        dict_item_name(c).unwrap_or_default().to_string(),
                    )
                })
                .collect();
            self.oci_classes = Some(classes);
        }
        let classes = self.oci_classes.as_deref().unwrap_or(&[]);
        class_id_from(classes, name)
    }

    /// Root template categories (Common service).
    pub async fn template_categories(&mut self) -> Result<Vec<Value>, OktawaveError> {
        let cid = self.cid().await?;
        let res = self
            .call(
                "get_template_categories",
                json!({"ClientId": cid}),
                CallOptions::common(),
            )
            .await?;
        Ok(dive_list(&res, &["template_category"])
            .into_iter()
            .cloned()
            .collect())
    }

    /// Templates directly under one category (Common service).
    pub async fn templates_by_category(
        &mut self,
        category_id: i64,
    ) -> Result<Vec<Value>, OktawaveError> {
        let cid = self.cid().await?;
        let res = self
            .call(
                "get_templates_by_category",
                json!({
                    "categoryId": category_id,
                    "categorySystemId": null,
                    "type": null,
                    "clientId": cid,
                }),
                CallOptions::common(),
            )
            .await?;
        Ok(dive_list(&res, &["template_view"])
            .into_iter()
            .cloned()
            .collect())
    }
}

// ── Pure helpers ────────────────────────────────────────────────────

/// First IPv4 address among the instance's network interfaces.
pub fn oci_ip(oci: &Value) -> Result<String, OktawaveError> {
    let id = dive_i64(oci, &["virtual_machine_id"]).unwrap_or(0);
    dive_list(oci, &["i_ps", "virtual_machine_ip"])
        .into_iter()
        .filter_map(|iface| dive_str(iface, &["address"]))
        .find(|addr| addr.parse::<std::net::Ipv4Addr>().is_ok())
        .map(str::to_string)
        .ok_or(OktawaveError::NoIpAddress { id })
}

/// First password-reveal entry's value parameter, in API order.
fn password_from_history(entries: &[&Value]) -> Option<String> {
    for entry in entries {
        let type_id = dive(entry, &["operation_type"])
            .and_then(|t| dict_name(t, "dictionary_item_name"))
            .and_then(|v| dive_i64(v, &["dictionary_item_id"]));
        if type_id == Some(OP_TYPE_PASSWORD_REVEAL) {
            return dive_str(
                entry,
                &["parameters", "virtual_machine_history_parameter", "value"],
            )
            .map(str::to_string);
        }
    }
    None
}

fn class_id_from(classes: &[(i64, String)], name: &str) -> Result<i64, OktawaveError> {
    for (id, class_name) in classes {
        if class_name == name {
            return Ok(*id);
        }
    }
    Err(OktawaveError::UnknownClass {
        name: name.to_string(),
        available: classes
            .iter()
            .map(|(_, n)| n.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    })
}
