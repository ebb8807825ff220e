//! SOAP transport for the legacy Oktawave API.
//!
//! The remote contract is RPC-over-XML (SOAP 1.2 + WS-Addressing) across
//! two named services, `Common` and `Clients`. Operation names on the wire
//! are the PascalCase form of the snake_case method names used in this
//! crate. Responses are decoded into a [`serde_json::Value`] tree with
//! namespace-stripped, snake_cased keys so the rest of the crate can use
//! the navigation helpers in [`crate::value`].
//!
//! Faults never escape as transport errors: they are translated into one
//! [`OktawaveError::ApiFault`] carrying the fault code, the human-readable
//! reason, and any structured detail records.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use serde_json::{Map, Value};

use crate::error::OktawaveError;
use crate::value::{dive, dive_list, dive_str};

/// Default API endpoint base.
pub const DEFAULT_API_URL: &str = "https://api.oktawave.com";

const NS_ENVELOPE: &str = "http://www.w3.org/2003/05/soap-envelope";
const NS_ADDRESSING: &str = "http://www.w3.org/2005/08/addressing";
const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
const NS_MODELS: &str = "http://schemas.datacontract.org/2004/07/K2.CloudsFactory.Common.Models";
const NS_CONTRACT: &str = "http://K2.CloudsFactory";

// ── Services and endpoint handles ───────────────────────────────────

/// The two webservices the API exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Account-independent operations (logon, dictionaries, templates).
    Common,
    /// Account-scoped operations (instances, histories).
    Clients,
}

impl Service {
    pub fn name(self) -> &'static str {
        match self {
            Service::Common => "Common",
            Service::Clients => "Clients",
        }
    }
}

/// A resolved remote operation descriptor.
///
/// Cached per (service, operation) for the lifetime of the transport —
/// there is no eviction, so a contract change mid-process goes unnoticed.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    pub action: String,
}

impl Endpoint {
    fn resolve(api_url: &str, service: Service, operation: &str) -> Self {
        Endpoint {
            url: format!("{}/{}Service.svc", api_url, service.name()),
            action: format!("{}/I{}/{}", NS_CONTRACT, service.name(), operation),
        }
    }
}

// ── Call options ────────────────────────────────────────────────────

/// Per-call options for [`SoapTransport::call`].
#[derive(Debug, Clone, Copy)]
pub struct CallOptions {
    pub service: Service,
    /// Return the whole decoded body instead of diving into
    /// `{op}_response.{op}_result`.
    pub no_auto_dive: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        CallOptions {
            service: Service::Clients,
            no_auto_dive: false,
        }
    }
}

impl CallOptions {
    pub fn common() -> Self {
        CallOptions {
            service: Service::Common,
            ..Default::default()
        }
    }
}

// ── Transport ───────────────────────────────────────────────────────

pub struct SoapTransport {
    http: reqwest::Client,
    api_url: String,
    login: String,
    password: String,
    endpoints: HashMap<(Service, String), Endpoint>,
}

impl SoapTransport {
    pub fn new(api_url: &str, login: &str, password: &str) -> Result<Self, OktawaveError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| OktawaveError::Http {
                context: "building HTTP client".into(),
                source: e,
            })?;
        Ok(SoapTransport {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            login: login.to_string(),
            password: password.to_string(),
            endpoints: HashMap::new(),
        })
    }

    /// Look up (or lazily resolve) the endpoint handle for an operation.
    fn endpoint(&mut self, service: Service, operation: &str) -> Endpoint {
        self.endpoints
            .entry((service, operation.to_string()))
            .or_insert_with(|| Endpoint::resolve(&self.api_url, service, operation))
            .clone()
    }

    /// Perform a SOAP call and return the decoded result.
    ///
    /// `method` is the snake_case method name (`get_virtual_machines`);
    /// `args` is the argument structure, serialized into the operation
    /// element in insertion order. Unless `no_auto_dive` is set, the
    /// returned value is the `{method}_response.{method}_result`
    /// substructure the contract always wraps results in (an empty map
    /// when absent).
    pub async fn call(
        &mut self,
        method: &str,
        args: &Value,
        options: CallOptions,
    ) -> Result<Value, OktawaveError> {
        let operation = pascal_case(method);
        let endpoint = self.endpoint(options.service, &operation);
        let envelope = build_envelope(&operation, &endpoint, args);

        tracing::debug!(method, service = options.service.name(), "SOAP request");
        tracing::trace!(body = %envelope, "SOAP request body");

        let response = self
            .http
            .post(&endpoint.url)
            .basic_auth(format!("API\\{}", self.login), Some(&self.password))
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .header("SOAPAction", &endpoint.action)
            .body(envelope)
            .send()
            .await
            .map_err(|e| OktawaveError::Http {
                context: format!("calling {operation}"),
                source: e,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| OktawaveError::Http {
            context: format!("reading {operation} response"),
            source: e,
        })?;

        tracing::trace!(%status, body = %body, "SOAP response");

        let doc = decode_xml(&body).map_err(|message| OktawaveError::Decode {
            operation: operation.clone(),
            message,
        })?;

        // Faults arrive with a non-success HTTP status but a regular SOAP
        // body; translate them before looking at the status at all.
        if let Some(fault) = dive(&doc, &["envelope", "body", "fault"]) {
            return Err(OktawaveError::ApiFault {
                message: fault_message(fault),
            });
        }
        if !status.is_success() {
            return Err(OktawaveError::Decode {
                operation,
                message: format!("HTTP {status} without a SOAP fault"),
            });
        }

        let full = dive(&doc, &["envelope", "body"])
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        if options.no_auto_dive {
            return Ok(full);
        }
        let response_key = format!("{method}_response");
        let result_key = format!("{method}_result");
        Ok(dive(&full, &[response_key.as_str(), result_key.as_str()])
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())))
    }
}

// ── Envelope building ───────────────────────────────────────────────

/// Render the request envelope.
///
/// Fixed protocol metadata required by the legacy contract: SOAP 1.2
/// envelope, WS-Addressing `Action`/`To` headers, and the data-contract
/// models namespace bound to `ins0` for nested argument structures.
fn build_envelope(operation: &str, endpoint: &Endpoint, args: &Value) -> String {
    let mut body = String::new();
    write_args(&mut body, args);
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<env:Envelope xmlns:env="{env}" xmlns:a="{a}" xmlns:i="{i}" xmlns:ins0="{ins0}">"#,
            "<env:Header>",
            "<a:Action>{action}</a:Action>",
            "<a:To>{to}</a:To>",
            "</env:Header>",
            "<env:Body>",
            r#"<{op} xmlns="{contract}">{body}</{op}>"#,
            "</env:Body>",
            "</env:Envelope>"
        ),
        env = NS_ENVELOPE,
        a = NS_ADDRESSING,
        i = NS_XSI,
        ins0 = NS_MODELS,
        action = endpoint.action,
        to = endpoint.url,
        op = operation,
        contract = NS_CONTRACT,
        body = body,
    )
}

/// Serialize an argument structure into XML elements, in insertion order.
/// Keys are used verbatim as element names (callers supply the `ins0:`
/// prefix where the contract wants the models namespace).
fn write_args(out: &mut String, args: &Value) {
    let Value::Object(map) = args else { return };
    for (key, value) in map {
        write_element(out, key, value);
    }
}

/// One element per value; a sequence becomes repeated sibling elements
/// under the same name, matching how the decoder reads them back.
fn write_element(out: &mut String, key: &str, value: &Value) {
    match value {
        Value::Null => {
            out.push_str(&format!(r#"<{key} i:nil="true"/>"#));
        }
        Value::Array(items) => {
            for item in items {
                write_element(out, key, item);
            }
        }
        Value::Object(_) => {
            out.push_str(&format!("<{key}>"));
            write_args(out, value);
            out.push_str(&format!("</{key}>"));
        }
        Value::String(s) => {
            out.push_str(&format!("<{key}>{}</{key}>", escape(s.as_str())));
        }
        other => {
            out.push_str(&format!("<{key}>{other}</{key}>"));
        }
    }
}

// ── Name conversions ────────────────────────────────────────────────

/// `logon_user` → `LogonUser` (each segment capitalized, rest lowered).
pub fn pascal_case(method: &str) -> String {
    method
        .split('_')
        .filter(|s| !s.is_empty())
        .map(|seg| {
            let mut chars = seg.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect()
}

/// Wire element name → snake_case key (`VMClass` → `vm_class`,
/// `IPs` → `i_ps`). An underscore is inserted before an uppercase letter
/// that follows a lowercase letter or digit, or that starts a new word
/// inside an acronym run.
pub fn underscore(tag: &str) -> String {
    let chars: Vec<char> = tag.chars().collect();
    let mut out = String::with_capacity(tag.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower)
            {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

// ── Response decoding ───────────────────────────────────────────────

struct Frame {
    name: String,
    children: Vec<(String, Value)>,
    text: String,
    nil: bool,
}

impl Frame {
    fn finish(self) -> (String, Value) {
        let value = if self.nil {
            Value::Null
        } else if !self.children.is_empty() {
            let mut map = Map::new();
            for (key, child) in self.children {
                match map.get_mut(&key) {
                    // Repeated sibling elements become an array.
                    Some(Value::Array(items)) => items.push(child),
                    Some(existing) => {
                        let first = existing.take();
                        *existing = Value::Array(vec![first, child]);
                    }
                    None => {
                        map.insert(key, child);
                    }
                }
            }
            Value::Object(map)
        } else if !self.text.is_empty() {
            Value::String(self.text)
        } else {
            Value::Null
        };
        (self.name, value)
    }
}

fn frame_for(e: &quick_xml::events::BytesStart) -> Result<Frame, String> {
    let name = underscore(&String::from_utf8_lossy(e.local_name().as_ref()));
    let mut nil = false;
    for attr in e.attributes() {
        let attr = attr.map_err(|e| format!("bad attribute: {e}"))?;
        if attr.key.local_name().as_ref() == b"nil" && attr.value.as_ref() == b"true" {
            nil = true;
        }
    }
    Ok(Frame {
        name,
        children: Vec::new(),
        text: String::new(),
        nil,
    })
}

/// Decode a response document into `{root_name: content}`.
///
/// Element names are namespace-stripped and snake_cased; repeated sibling
/// elements group into arrays; `nil="true"` and empty elements become
/// `null`; text-only elements become strings.
pub fn decode_xml(xml: &str) -> Result<Value, String> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => stack.push(frame_for(&e)?),
            Event::Empty(e) => {
                let (name, value) = frame_for(&e)?.finish();
                match stack.last_mut() {
                    Some(parent) => parent.children.push((name, value)),
                    None => root = Some((name, value)),
                }
            }
            Event::Text(t) => {
                if let Some(frame) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| e.to_string())?;
                    frame.text.push_str(text.trim());
                }
            }
            Event::CData(t) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Event::End(_) => {
                let frame = stack.pop().ok_or("unbalanced closing tag")?;
                let (name, value) = frame.finish();
                match stack.last_mut() {
                    Some(parent) => parent.children.push((name, value)),
                    None => root = Some((name, value)),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let (name, value) = root.ok_or("no root element")?;
    let mut map = Map::new();
    map.insert(name, value);
    Ok(Value::Object(map))
}

// ── Fault translation ───────────────────────────────────────────────

/// Compose the human-readable message for a decoded SOAP fault: the fault
/// code and reason, followed by one line per structured detail record.
pub fn fault_message(fault: &Value) -> String {
    let code = dive_str(fault, &["code", "value"]).unwrap_or("");
    let reason = dive_str(fault, &["reason", "text"]).unwrap_or("Unknown error");
    let mut msg = format!("Oktawave API reported error: {code} - {reason}");
    for detail in dive_list(fault, &["detail"]) {
        let Value::Object(records) = detail else {
            continue;
        };
        for (_key, record) in records {
            let flattened = match record {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            };
            for rec in flattened {
                let error_code = dive_str(rec, &["error_code"]).unwrap_or("-");
                let error_msg = dive_str(rec, &["error_msg"]).unwrap_or("unknown");
                msg.push_str(&format!("\n{error_code} - {error_msg}"));
            }
        }
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pascal_case_joins_segments() {
        assert_eq!(pascal_case("logon_user"), "LogonUser");
        assert_eq!(pascal_case("get_virtual_machine_by_id"), "GetVirtualMachineById");
        assert_eq!(pascal_case("turnoff_virtual_machine"), "TurnoffVirtualMachine");
    }

    #[test]
    fn underscore_handles_acronym_runs() {
        assert_eq!(underscore("VirtualMachineId"), "virtual_machine_id");
        assert_eq!(underscore("VMClass"), "vm_class");
        assert_eq!(underscore("IPs"), "i_ps");
        assert_eq!(
            underscore("_x003C_Client_x003E_k__BackingField"),
            "_x003_c_client_x003_e_k__backing_field"
        );
    }

    #[test]
    fn endpoint_resolution_uses_service_and_operation() {
        let ep = Endpoint::resolve("https://api.oktawave.com", Service::Common, "LogonUser");
        assert_eq!(ep.url, "https://api.oktawave.com/CommonService.svc");
        assert_eq!(ep.action, "http://K2.CloudsFactory/ICommon/LogonUser");
    }

    #[test]
    fn envelope_carries_protocol_metadata() {
        let ep = Endpoint::resolve("https://api.example.com", Service::Clients, "DeleteVirtualMachine");
        let env = build_envelope(
            "DeleteVirtualMachine",
            &ep,
            &json!({"virtualMachineId": 7, "clientId": 42}),
        );
        assert!(env.contains("<a:Action>http://K2.CloudsFactory/IClients/DeleteVirtualMachine</a:Action>"));
        assert!(env.contains("<a:To>https://api.example.com/ClientsService.svc</a:To>"));
        assert!(env.contains(r#"<DeleteVirtualMachine xmlns="http://K2.CloudsFactory">"#));
        assert!(env.contains("<virtualMachineId>7</virtualMachineId>"));
        assert!(env.contains("<clientId>42</clientId>"));
    }

    #[test]
    fn envelope_nested_args_and_nulls() {
        let ep = Endpoint::resolve("https://api.example.com", Service::Clients, "GetVirtualMachineHistories");
        let env = build_envelope(
            "GetVirtualMachineHistories",
            &ep,
            &json!({
                "searchParams": {"ins0:PageSize": 100, "ins0:VirtualMachineId": 5},
                "type": null,
            }),
        );
        assert!(env.contains("<searchParams><ins0:PageSize>100</ins0:PageSize>"));
        assert!(env.contains(r#"<type i:nil="true"/>"#));
    }

    #[test]
    fn envelope_arrays_become_repeated_elements() {
        let ep = Endpoint::resolve("https://api.example.com", Service::Clients, "CreateVirtualMachine");
        let env = build_envelope(
            "CreateVirtualMachine",
            &ep,
            &json!({"disks": {"ins0:DiskId": [1, 2]}}),
        );
        assert!(env.contains(
            "<disks><ins0:DiskId>1</ins0:DiskId><ins0:DiskId>2</ins0:DiskId></disks>"
        ));
    }

    #[test]
    fn envelope_escapes_text() {
        let ep = Endpoint::resolve("https://api.example.com", Service::Clients, "CreateVirtualMachine");
        let env = build_envelope("CreateVirtualMachine", &ep, &json!({"machineName": "a<b&c"}));
        assert!(env.contains("<machineName>a&lt;b&amp;c</machineName>"));
    }

    #[test]
    fn decode_snake_cases_and_groups_repeats() {
        let doc = decode_xml(
            r#"<s:Root xmlns:s="urn:x">
                 <s:Items>
                   <s:ItemView><s:VirtualMachineId>1</s:VirtualMachineId></s:ItemView>
                   <s:ItemView><s:VirtualMachineId>2</s:VirtualMachineId></s:ItemView>
                 </s:Items>
               </s:Root>"#,
        )
        .unwrap();
        let rows = dive_list(&doc, &["root", "items", "item_view"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(dive_str(rows[1], &["virtual_machine_id"]), Some("2"));
    }

    #[test]
    fn decode_nil_and_empty_elements_are_null() {
        let doc = decode_xml(
            r#"<Root xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
                 <Gone i:nil="true"/>
                 <Empty></Empty>
                 <Name>web-1</Name>
               </Root>"#,
        )
        .unwrap();
        assert_eq!(dive(&doc, &["root", "gone"]), None);
        assert_eq!(dive(&doc, &["root", "empty"]), None);
        assert_eq!(dive_str(&doc, &["root", "name"]), Some("web-1"));
    }

    #[test]
    fn decode_unescapes_entities() {
        let doc = decode_xml("<Root><Name>a &amp; b</Name></Root>").unwrap();
        assert_eq!(dive_str(&doc, &["root", "name"]), Some("a & b"));
    }

    #[test]
    fn fault_message_composes_code_reason_and_details() {
        let fault = json!({
            "code": {"value": "Err1"},
            "reason": {"text": "bad thing"},
            "detail": {
                "error_detail": [
                    {"error_code": "101", "error_msg": "first problem"},
                    {"error_code": "102", "error_msg": "second problem"},
                ]
            }
        });
        let msg = fault_message(&fault);
        assert_eq!(
            msg,
            "Oktawave API reported error: Err1 - bad thing\n101 - first problem\n102 - second problem"
        );
    }

    #[test]
    fn fault_message_without_details() {
        let fault = json!({"code": {"value": "Err2"}});
        assert_eq!(fault_message(&fault), "Oktawave API reported error: Err2 - Unknown error");
    }

    #[test]
    fn fault_decoded_from_wire_shape() {
        // SOAP 1.2 fault as it comes off the wire, through decode_xml.
        let doc = decode_xml(
            r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope">
                 <env:Body>
                   <env:Fault>
                     <env:Code><env:Value>env:Receiver</env:Value></env:Code>
                     <env:Reason><env:Text xml:lang="en">Machine is locked</env:Text></env:Reason>
                     <env:Detail>
                       <ApiError><ErrorCode>4021</ErrorCode><ErrorMsg>operation in progress</ErrorMsg></ApiError>
                     </env:Detail>
                   </env:Fault>
                 </env:Body>
               </env:Envelope>"#,
        )
        .unwrap();
        let fault = dive(&doc, &["envelope", "body", "fault"]).unwrap();
        let msg = fault_message(fault);
        assert!(msg.contains("env:Receiver - Machine is locked"));
        assert!(msg.contains("4021 - operation in progress"));
    }
}
