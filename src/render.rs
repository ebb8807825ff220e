//! Table rendering for CLI output.
//!
//! Consumes the client's semi-structured values and the walker's event
//! stream; never touches the network. Kept apart from the client so the
//! core returns data, not formatted text.

use console::style;
use serde_json::Value;

use crate::templates::TemplateEvent;
use crate::value::{dict_item_name, dict_name, dive, dive_list, dive_str};

/// Align and print rows under bold headers.
fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }
    let header_line = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{}", style(format!("{:<w$}", h, w = widths[i])).bold()))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{header_line}");
    for row in rows {
        let line = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<w$}", cell, w = widths.get(i).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join("  ");
        println!("{}", line.trim_end());
    }
}

fn field(oci: &Value, path: &[&str]) -> String {
    dive_str(oci, path).unwrap_or("").to_string()
}

fn dict_field(oci: &Value, key: &str) -> String {
    dive(oci, &[key])
        .and_then(dict_item_name)
        .unwrap_or("")
        .to_string()
}

fn yes_no(oci: &Value, path: &[&str]) -> String {
    if dive_str(oci, path) == Some("true") { "Yes" } else { "No" }.to_string()
}

fn pair(label: &str, value: &str) {
    if !value.is_empty() {
        println!("{}: {value}", style(label).cyan());
    }
}

/// Basic identification block, used before deletes and bootstraps.
pub fn print_oci_summary(oci: &Value) {
    pair("OCI ID", &field(oci, &["virtual_machine_id"]));
    pair("Name", &field(oci, &["virtual_machine_name"]));
    pair("Class", &dict_field(oci, "vm_class"));
    pair("Status", &dict_field(oci, "status"));
}

/// `oci list` table.
pub fn print_oci_list(rows: &[Value]) {
    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|o| {
            vec![
                field(o, &["virtual_machine_id"]),
                field(o, &["virtual_machine_name"]),
                dict_field(o, "vm_class"),
            ]
        })
        .collect();
    print_table(&["ID", "Name", "Class"], &table);
}

/// `oci show` detail panel plus the disks and IP-addresses tables.
pub fn print_oci_detail(oci: &Value) {
    pair("ID", &field(oci, &["virtual_machine_id"]));
    pair("Name", &field(oci, &["virtual_machine_name"]));
    pair("Class", &dict_field(oci, "vm_class"));
    pair("Status", &dict_field(oci, "status"));
    pair("System category", &dict_field(oci, "system_category"));
    pair("Autoscaling", &dict_field(oci, "auto_scaling_type"));
    pair("Connection", &dict_field(oci, "connection_type"));
    pair(
        "CPU (used / available)",
        &format!(
            "{} MHz / {} MHz",
            field(oci, &["cpu_mhz_usage"]),
            field(oci, &["cpu_mhz"])
        ),
    );
    pair(
        "Memory (used / available)",
        &format!(
            "{} MB / {} MB",
            field(oci, &["ram_mb_usage"]),
            field(oci, &["ram_mb"])
        ),
    );
    pair("IOPS", &field(oci, &["iops_usage"]));
    pair("Monitoring", &dict_field(oci, "monit_status"));
    pair("Payment type", &dict_field(oci, "payment_type"));

    println!("\nDisks");
    let disks: Vec<Vec<String>> = dive_list(oci, &["disk_drives", "virtual_machine_hdd"])
        .iter()
        .map(|d| {
            vec![
                field(d, &["client_hdd", "client_hdd_id"]),
                field(d, &["client_hdd", "hdd_name"]),
                format!("{} GB", field(d, &["client_hdd", "capacity_gb"])),
                dive(d, &["client_hdd", "hdd_standard"])
                    .and_then(dict_item_name)
                    .unwrap_or("")
                    .to_string(),
                yes_no(d, &["is_primary"]),
                yes_no(d, &["client_hdd", "is_shared"]),
            ]
        })
        .collect();
    print_table(&["ID", "Name", "Size", "Tier", "Primary?", "Shared?"], &disks);

    println!("\nIP addresses");
    let ips: Vec<Vec<String>> = dive_list(oci, &["i_ps", "virtual_machine_ip"])
        .iter()
        .map(|ip| {
            vec![
                field(ip, &["address"]),
                field(ip, &["address_v6"]),
                field(ip, &["dhcp_branch"]),
                field(ip, &["gateway"]),
                dive(ip, &["ip_status"]).and_then(dict_item_name).unwrap_or("").to_string(),
                dive(ip, &["ip_type"]).and_then(dict_item_name).unwrap_or("").to_string(),
                field(ip, &["mac_address"]),
            ]
        })
        .collect();
    print_table(
        &["IPv4 address", "IPv6 address", "DHCP branch", "Gateway", "Status", "Type", "MAC address"],
        &ips,
    );
}

// ── Template tree rendering ─────────────────────────────────────────

/// Buffers walker events and prints one table per category that actually
/// has templates: a category-path header, the fixed ID/Name/Minimum
/// class columns, then the category's own extra columns.
#[derive(Default)]
pub struct TemplateTablePrinter {
    category_stack: Vec<Value>,
    buffered: Vec<Value>,
}

impl TemplateTablePrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: TemplateEvent<'_>) {
        match event {
            TemplateEvent::CategoryEnter { category, .. } => {
                self.category_stack.push(category.clone());
            }
            TemplateEvent::Template { template, .. } => {
                self.buffered.push(template.clone());
            }
            TemplateEvent::CategoryExit { .. } => {
                self.flush();
                self.category_stack.pop();
            }
            TemplateEvent::NoTemplates { .. } | TemplateEvent::NoSubcategories { .. } => {}
        }
    }

    fn flush(&mut self) {
        if self.buffered.is_empty() {
            return;
        }
        let path = self
            .category_stack
            .iter()
            .map(category_name)
            .collect::<Vec<_>>()
            .join(" -> ");
        println!("\n{}: {path}", style("Category").bold());

        let columns = self
            .category_stack
            .last()
            .map(|c| extra_columns(c))
            .unwrap_or_default();

        let mut headers = vec!["ID", "Name", "Minimum class"];
        headers.extend(columns.iter().map(|(name, _)| name.as_str()));

        let rows: Vec<Vec<String>> = self
            .buffered
            .iter()
            .map(|t| {
                let mut row = vec![
                    field(t, &["template_id"]),
                    field(t, &["name"]),
                    dict_field(t, "min_class"),
                ];
                for (_, column_id) in &columns {
                    row.push(template_parameter(t, column_id));
                }
                row
            })
            .collect();
        print_table(&headers, &rows);
        self.buffered.clear();
    }
}

fn category_name(category: &Value) -> String {
    dict_name(category, "template_category_name")
        .and_then(|v| dive_str(v, &["category_name"]))
        .unwrap_or("")
        .to_string()
}

/// The category's extra table columns, as (localized name, dictionary id)
/// pairs. The always-present ID column is skipped.
fn extra_columns(category: &Value) -> Vec<(String, String)> {
    dive_list(category, &["category_columns", "template_category_column"])
        .iter()
        .filter_map(|c| {
            let name_dict = dive(c, &["column_name_dict"])?;
            let variant = dict_name(name_dict, "dictionary_item_name")?;
            let name = dive_str(variant, &["item_name"])?;
            let id = dive_str(variant, &["dictionary_item_id"])?;
            Some((name.to_string(), id.to_string()))
        })
        .filter(|(name, _)| name != "ID")
        .collect()
}

fn template_parameter(template: &Value, column_id: &str) -> String {
    dive_list(template, &["template_parameters", "template_parameter"])
        .iter()
        .find(|p| dive_str(p, &["column_name_dict_id"]) == Some(column_id))
        .and_then(|p| dive_str(p, &["column_value"]))
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extra_columns_skip_id_and_localize() {
        let category = json!({
            "category_columns": {
                "template_category_column": [
                    {"column_name_dict": {"dictionary_item_names": {"dictionary_item_name":
                        {"language_dict_id": "2", "item_name": "ID", "dictionary_item_id": "1"}}}},
                    {"column_name_dict": {"dictionary_item_names": {"dictionary_item_name":
                        {"language_dict_id": "2", "item_name": "Version", "dictionary_item_id": "9"}}}},
                ]
            }
        });
        let columns = extra_columns(&category);
        assert_eq!(columns, vec![("Version".to_string(), "9".to_string())]);
    }

    #[test]
    fn template_parameter_maps_column_id_to_value() {
        let template = json!({
            "template_parameters": {
                "template_parameter": [
                    {"column_name_dict_id": "9", "column_value": "22.04"},
                    {"column_name_dict_id": "8", "column_value": "x86_64"},
                ]
            }
        });
        assert_eq!(template_parameter(&template, "9"), "22.04");
        assert_eq!(template_parameter(&template, "7"), "");
    }

    #[test]
    fn category_name_prefers_localized_variant() {
        let category = json!({
            "template_category_names": {
                "template_category_name": [
                    {"language_dict_id": "1", "category_name": "Linuksy"},
                    {"language_dict_id": "2", "category_name": "Linux"},
                ]
            }
        });
        assert_eq!(category_name(&category), "Linux");
    }
}
