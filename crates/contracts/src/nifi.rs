//! Wire types for the subset of the NiFi REST API the gateway speaks.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResultsEnvelope {
    #[serde(rename = "searchResultsDTO", default)]
    pub search_results: SearchResultsDto,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultsDto {
    #[serde(default)]
    pub processor_results: Vec<ComponentSearchResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSearchResult {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorEntity {
    pub id: String,
    pub revision: RevisionDto,
    #[serde(default)]
    pub component: ProcessorComponent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionDto {
    pub version: i64,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessorComponent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// A processor as seen by one gateway request. Never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorRef {
    pub id: String,
    pub name: Option<String>,
    pub revision_version: i64,
    pub client_id: Option<String>,
    pub state: Option<String>,
    pub current_config: serde_json::Value,
}

impl From<ProcessorEntity> for ProcessorRef {
    fn from(entity: ProcessorEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.component.name,
            revision_version: entity.revision.version,
            client_id: entity.revision.client_id,
            state: entity.component.state,
            current_config: entity.component.config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationRequest {
    SchedulingUpdate { period: String, strategy: String },
    StateUpdate { state: String },
}

impl MutationRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            MutationRequest::SchedulingUpdate { .. } => "scheduling_update",
            MutationRequest::StateUpdate { .. } => "state_update",
        }
    }

    /// Builds the `PUT /processors/{id}` body. The revision is always the one
    /// carried by `target`.
    pub fn body_for(&self, target: &ProcessorRef) -> serde_json::Value {
        let mut revision = serde_json::json!({
            "version": target.revision_version.to_string(),
        });
        if let Some(client_id) = target.client_id.as_ref() {
            revision["clientId"] = serde_json::Value::String(client_id.clone());
        }

        match self {
            MutationRequest::SchedulingUpdate { period, strategy } => serde_json::json!({
                "revision": revision,
                "component": {
                    "id": target.id,
                    "config": {
                        "schedulingPeriod": period,
                        "schedulingStrategy": strategy,
                    }
                }
            }),
            MutationRequest::StateUpdate { state } => serde_json::json!({
                "id": target.id,
                "revision": revision,
                "status": {
                    "runStatus": state,
                },
                "component": {
                    "id": target.id,
                    "state": state,
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor_ref(version: i64) -> ProcessorRef {
        ProcessorRef {
            id: "abc-123".to_string(),
            name: Some("CsvIngest".to_string()),
            revision_version: version,
            client_id: None,
            state: Some("RUNNING".to_string()),
            current_config: serde_json::json!({"schedulingPeriod": "0 sec"}),
        }
    }

    #[test]
    fn search_results_parse_processor_ids_in_order() {
        let raw = serde_json::json!({
            "searchResultsDTO": {
                "processorResults": [
                    {"id": "first", "name": "CsvIngest", "groupId": "root", "matches": ["Name: CsvIngest"]},
                    {"id": "second", "name": "CsvIngestArchive", "groupId": "root", "matches": []}
                ],
                "connectionResults": []
            }
        });

        let parsed: SearchResultsEnvelope =
            serde_json::from_value(raw).expect("search results should parse");
        let ids = parsed
            .search_results
            .processor_results
            .iter()
            .map(|r| r.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn search_results_without_processor_section_parse_as_empty() {
        let parsed: SearchResultsEnvelope =
            serde_json::from_value(serde_json::json!({"searchResultsDTO": {}}))
                .expect("search results should parse");
        assert!(parsed.search_results.processor_results.is_empty());

        let parsed: SearchResultsEnvelope = serde_json::from_value(serde_json::json!({}))
            .expect("missing envelope should parse");
        assert!(parsed.search_results.processor_results.is_empty());
    }

    #[test]
    fn processor_entity_converts_to_ref() {
        let raw = serde_json::json!({
            "id": "abc-123",
            "revision": {"version": 4, "clientId": "client-1"},
            "component": {
                "id": "abc-123",
                "name": "CsvIngest",
                "state": "STOPPED",
                "config": {"schedulingPeriod": "1 sec", "schedulingStrategy": "TIMER_DRIVEN"}
            },
            "status": {"runStatus": "Stopped"}
        });

        let entity: ProcessorEntity =
            serde_json::from_value(raw).expect("processor entity should parse");
        let processor = ProcessorRef::from(entity);

        assert_eq!(processor.id, "abc-123");
        assert_eq!(processor.revision_version, 4);
        assert_eq!(processor.client_id.as_deref(), Some("client-1"));
        assert_eq!(processor.state.as_deref(), Some("STOPPED"));
        assert_eq!(processor.current_config["schedulingPeriod"], "1 sec");
    }

    #[test]
    fn scheduling_body_carries_revision_and_config() {
        let body = MutationRequest::SchedulingUpdate {
            period: "10 sec".to_string(),
            strategy: "TIMER_DRIVEN".to_string(),
        }
        .body_for(&processor_ref(4));

        assert_eq!(
            body,
            serde_json::json!({
                "revision": {"version": "4"},
                "component": {
                    "id": "abc-123",
                    "config": {
                        "schedulingPeriod": "10 sec",
                        "schedulingStrategy": "TIMER_DRIVEN"
                    }
                }
            })
        );
    }

    #[test]
    fn state_body_sets_run_status_and_component_state() {
        let body = MutationRequest::StateUpdate {
            state: "STOPPED".to_string(),
        }
        .body_for(&processor_ref(5));

        assert_eq!(body["id"], "abc-123");
        assert_eq!(body["revision"]["version"], "5");
        assert_eq!(body["status"]["runStatus"], "STOPPED");
        assert_eq!(body["component"]["state"], "STOPPED");
        assert_eq!(body["component"]["id"], "abc-123");
    }

    #[test]
    fn body_echoes_remote_client_id() {
        let mut target = processor_ref(7);
        target.client_id = Some("client-9".to_string());

        let body = MutationRequest::StateUpdate {
            state: "RUNNING".to_string(),
        }
        .body_for(&target);

        assert_eq!(
            body["revision"],
            serde_json::json!({"version": "7", "clientId": "client-9"})
        );
    }
}
