//! Reference services for the content and learner subsystems.
//!
//! Deterministic stand-ins for the real content pipeline: good enough to
//! walk a course through every approval gate from the command line.

use async_trait::async_trait;
use courseflow_engine::{EngineResult, OrchestrationEngine, Service, ServiceContext, ServiceError, ServiceOutput};
use courseflow_types::{keys, ExecutionState, ServiceDescriptor, Subsystem};
use serde_json::{json, Value};
use std::sync::Arc;

/// Objectives grouped into one module
const OBJECTIVES_PER_MODULE: usize = 3;

/// Register every reference service on an engine
pub fn register_reference_services(engine: &OrchestrationEngine) -> EngineResult<()> {
    engine.register_service(Arc::new(Chunker::new()))?;
    engine.register_service(Arc::new(ObjectiveExtractor::new()))?;
    engine.register_service(Arc::new(StructureBuilder::new()))?;
    engine.register_service(Arc::new(GraphBuilder::new()))?;
    engine.register_service(Arc::new(LearningTreeBuilder::new()))?;
    engine.validate_registry()
}

fn required<'a>(state: &'a ExecutionState, key: &str) -> Result<&'a Value, ServiceError> {
    state
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ServiceError::MissingInput(key.to_string()))
}

/// Promoted draft inside an approved artifact
fn approved<'a>(
    artifact: &'a Value,
    artifact_key: &str,
    key: &str,
) -> Result<&'a Value, ServiceError> {
    artifact
        .get(key)
        .ok_or_else(|| ServiceError::invalid_input(artifact_key, format!("missing {}", key)))
}

fn array<'a>(value: &'a Value, key: &str) -> Result<&'a Vec<Value>, ServiceError> {
    value
        .as_array()
        .ok_or_else(|| ServiceError::invalid_input(key, "expected an array"))
}

// ── content.chunker ──────────────────────────────────────────────────

/// Splits the content source into paragraph chunks
struct Chunker {
    descriptor: ServiceDescriptor,
}

impl Chunker {
    fn new() -> Self {
        Self {
            descriptor: ServiceDescriptor::new("content.chunker", Subsystem::Content, "Chunker")
                .with_description("Split course content into chunks")
                .requires(keys::CONTENT_SOURCE)
                .provides(keys::CHUNKS),
        }
    }
}

#[async_trait]
impl Service for Chunker {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        _ctx: &ServiceContext,
        state: &ExecutionState,
    ) -> Result<ServiceOutput, ServiceError> {
        let source = required(state, keys::CONTENT_SOURCE)?;
        let text = match source {
            Value::String(s) => s.clone(),
            Value::Object(map) => match map.get("text").or_else(|| map.get("uri")) {
                Some(Value::String(s)) => s.clone(),
                _ => source.to_string(),
            },
            other => other.to_string(),
        };

        let chunks: Vec<Value> = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .enumerate()
            .map(|(i, p)| json!({"id": format!("chunk-{}", i + 1), "text": p}))
            .collect();
        if chunks.is_empty() {
            return Err(ServiceError::invalid_input(keys::CONTENT_SOURCE, "no content"));
        }

        Ok(ServiceOutput::new().with(keys::CHUNKS, Value::Array(chunks)))
    }
}

// ── content.lo_extractor ─────────────────────────────────────────────

/// One learning objective per chunk, from its first sentence
struct ObjectiveExtractor {
    descriptor: ServiceDescriptor,
}

impl ObjectiveExtractor {
    fn new() -> Self {
        Self {
            descriptor: ServiceDescriptor::new(
                "content.lo_extractor",
                Subsystem::Content,
                "Learning objective extractor",
            )
            .depends_on("content.chunker")
            .requires(keys::CHUNKS)
            .provides(keys::LEARNING_OBJECTIVES),
        }
    }
}

#[async_trait]
impl Service for ObjectiveExtractor {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        _ctx: &ServiceContext,
        state: &ExecutionState,
    ) -> Result<ServiceOutput, ServiceError> {
        let chunks = array(required(state, keys::CHUNKS)?, keys::CHUNKS)?;

        let objectives: Vec<Value> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let text = chunk.get("text").and_then(Value::as_str).unwrap_or_default();
                let sentence = text.split('.').next().unwrap_or(text).trim();
                json!({
                    "id": format!("lo-{}", i + 1),
                    "statement": format!("Explain {}", sentence),
                    "source": chunk.get("id"),
                })
            })
            .collect();

        let mut draft = json!({ "objectives": objectives });
        if let Some(feedback) = state.get(keys::FACULTY_FEEDBACK) {
            draft["faculty_feedback"] = feedback.clone();
        }
        Ok(ServiceOutput::new().with(keys::LEARNING_OBJECTIVES, draft))
    }
}

// ── content.structure_builder ────────────────────────────────────────

/// Groups approved objectives into modules
struct StructureBuilder {
    descriptor: ServiceDescriptor,
}

impl StructureBuilder {
    fn new() -> Self {
        Self {
            descriptor: ServiceDescriptor::new(
                "content.structure_builder",
                Subsystem::Content,
                "Course structure builder",
            )
            .requires(keys::FACD)
            .provides(keys::COURSE_STRUCTURE),
        }
    }
}

#[async_trait]
impl Service for StructureBuilder {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        _ctx: &ServiceContext,
        state: &ExecutionState,
    ) -> Result<ServiceOutput, ServiceError> {
        let facd = required(state, keys::FACD)?;
        let los = approved(facd, keys::FACD, keys::APPROVED_LEARNING_OBJECTIVES)?;
        let objectives = match los.get("objectives") {
            Some(objectives) => array(objectives, keys::FACD)?.clone(),
            None => array(los, keys::FACD)?.clone(),
        };

        let modules: Vec<Value> = objectives
            .chunks(OBJECTIVES_PER_MODULE)
            .enumerate()
            .map(|(i, group)| {
                let ids: Vec<&Value> = group.iter().filter_map(|o| o.get("id")).collect();
                json!({
                    "id": format!("module-{}", i + 1),
                    "title": format!("Module {}", i + 1),
                    "objectives": ids,
                })
            })
            .collect();

        Ok(ServiceOutput::new().with(keys::COURSE_STRUCTURE, json!({ "modules": modules })))
    }
}

// ── content.kg_builder ───────────────────────────────────────────────

/// Knowledge graph: module and objective nodes, containment and
/// prerequisite edges
struct GraphBuilder {
    descriptor: ServiceDescriptor,
}

impl GraphBuilder {
    fn new() -> Self {
        Self {
            descriptor: ServiceDescriptor::new(
                "content.kg_builder",
                Subsystem::Content,
                "Knowledge graph builder",
            )
            .requires(keys::FCCS)
            .provides(keys::KNOWLEDGE_GRAPH),
        }
    }
}

#[async_trait]
impl Service for GraphBuilder {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        _ctx: &ServiceContext,
        state: &ExecutionState,
    ) -> Result<ServiceOutput, ServiceError> {
        let fccs = required(state, keys::FCCS)?;
        let structure = approved(fccs, keys::FCCS, keys::APPROVED_STRUCTURE)?;
        let modules = match structure.get("modules") {
            Some(modules) => array(modules, keys::FCCS)?.clone(),
            None => Vec::new(),
        };

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut previous: Option<Value> = None;
        for module in &modules {
            let module_id = module.get("id").cloned().unwrap_or(Value::Null);
            nodes.push(json!({"id": module_id, "kind": "module"}));
            if let Some(objectives) = module.get("objectives").and_then(Value::as_array) {
                for objective in objectives {
                    nodes.push(json!({"id": objective, "kind": "objective"}));
                    edges.push(json!({"from": module_id, "to": objective, "kind": "contains"}));
                }
            }
            if let Some(prev) = previous.replace(module_id.clone()) {
                edges.push(json!({"from": prev, "to": module_id, "kind": "prerequisite"}));
            }
        }

        Ok(ServiceOutput::new().with(
            keys::KNOWLEDGE_GRAPH,
            json!({ "nodes": nodes, "edges": edges }),
        ))
    }
}

// ── learner.plt_builder ──────────────────────────────────────────────

/// Walks the finalized graph in prerequisite order for one learner
struct LearningTreeBuilder {
    descriptor: ServiceDescriptor,
}

impl LearningTreeBuilder {
    fn new() -> Self {
        Self {
            descriptor: ServiceDescriptor::new(
                "learner.plt_builder",
                Subsystem::Learner,
                "Personalized learning tree builder",
            )
            .requires(keys::FFCS)
            .requires(keys::LEARNER_ID)
            .provides(keys::PERSONALIZED_LEARNING_TREE),
        }
    }
}

#[async_trait]
impl Service for LearningTreeBuilder {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        _ctx: &ServiceContext,
        state: &ExecutionState,
    ) -> Result<ServiceOutput, ServiceError> {
        let ffcs = required(state, keys::FFCS)?;
        let graph = approved(ffcs, keys::FFCS, keys::APPROVED_KNOWLEDGE_GRAPH)?;
        let learner = required(state, keys::LEARNER_ID)?.clone();

        let edges = graph
            .get("edges")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let path: Vec<Value> = graph
            .get("nodes")
            .and_then(Value::as_array)
            .map(|nodes| {
                nodes
                    .iter()
                    .filter(|n| n.get("kind").and_then(Value::as_str) == Some("module"))
                    .filter_map(|n| n.get("id").cloned())
                    .map(|module| {
                        let steps: Vec<&Value> = edges
                            .iter()
                            .filter(|e| {
                                e.get("kind").and_then(Value::as_str) == Some("contains")
                                    && e.get("from") == Some(&module)
                            })
                            .filter_map(|e| e.get("to"))
                            .collect();
                        json!({"module": module, "steps": steps})
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ServiceOutput::new().with(
            keys::PERSONALIZED_LEARNING_TREE,
            json!({ "learner_id": learner, "path": path }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courseflow_engine::OrchestrationRequest;
    use courseflow_types::ServiceId;

    #[tokio::test]
    async fn test_content_batch_produces_objectives() {
        let engine = OrchestrationEngine::default();
        register_reference_services(&engine).unwrap();

        let report = engine
            .run(OrchestrationRequest::content(
                "c1",
                json!({"text": "Graphs model pairs.\n\nTrees are acyclic graphs."}),
            ))
            .await
            .unwrap();

        let objectives = &report.state.get(keys::LEARNING_OBJECTIVES).unwrap()["objectives"];
        assert_eq!(objectives.as_array().unwrap().len(), 2);
        assert_eq!(objectives[0]["statement"], json!("Explain Graphs model pairs"));
        assert_eq!(
            report.waiting,
            vec![
                ServiceId::new("content.kg_builder"),
                ServiceId::new("content.structure_builder")
            ]
        );
    }

    #[tokio::test]
    async fn test_structure_and_graph_read_approved_artifacts() {
        let engine = OrchestrationEngine::default();
        register_reference_services(&engine).unwrap();

        let facd = json!({
            "approvedLearningObjectives": {
                "objectives": [{"id": "lo-1"}, {"id": "lo-2"}, {"id": "lo-3"}, {"id": "lo-4"}]
            },
            "courseId": "c1",
            "approvedBy": "prof-1"
        });
        let report = engine
            .run_state(
                Subsystem::Content,
                ExecutionState::new().with_value(keys::FACD, facd),
                Default::default(),
            )
            .await
            .unwrap();
        let structure = report.state.get(keys::COURSE_STRUCTURE).unwrap();
        assert_eq!(structure["modules"].as_array().unwrap().len(), 2);
        assert_eq!(structure["modules"][1]["objectives"], json!(["lo-4"]));

        let fccs = json!({"approvedStructure": structure, "courseId": "c1"});
        let report = engine
            .run_state(
                Subsystem::Content,
                ExecutionState::new().with_value(keys::FCCS, fccs),
                Default::default(),
            )
            .await
            .unwrap();
        let graph = report.state.get(keys::KNOWLEDGE_GRAPH).unwrap();
        assert_eq!(graph["nodes"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_unwrapped_facd_is_rejected() {
        let engine = OrchestrationEngine::default();
        register_reference_services(&engine).unwrap();

        let report = engine
            .run_state(
                Subsystem::Content,
                ExecutionState::new().with_value(keys::FACD, json!({"objectives": []})),
                Default::default(),
            )
            .await
            .unwrap();
        let id = ServiceId::new("content.structure_builder");
        assert!(report.failed.contains(&id));
        assert!(report.state.get(keys::COURSE_STRUCTURE).is_none());
    }

    #[tokio::test]
    async fn test_learner_tree_follows_modules() {
        let engine = OrchestrationEngine::default();
        register_reference_services(&engine).unwrap();

        let ffcs = json!({
            "approvedKnowledgeGraph": {
                "nodes": [
                    {"id": "module-1", "kind": "module"},
                    {"id": "lo-1", "kind": "objective"}
                ],
                "edges": [{"from": "module-1", "to": "lo-1", "kind": "contains"}]
            },
            "courseId": "c1",
            "approvedBy": "prof-1"
        });
        let report = engine
            .run(OrchestrationRequest::learner("c1", "learner-1").with_input(keys::FFCS, ffcs))
            .await
            .unwrap();

        let tree = report.state.get(keys::PERSONALIZED_LEARNING_TREE).unwrap();
        assert_eq!(tree["learner_id"], json!("learner-1"));
        assert_eq!(tree["path"][0]["steps"], json!(["lo-1"]));
    }
}
