//! End-to-end loader scenarios against the in-memory store

#[cfg(test)]
mod tests {
    use crate::loader::{
        CancellationToken, CombinationElement, CountingObserver, FixedElement, Loader, LoaderError, LoopVariable,
        Mapping, PathElement, RunObserver, Signature, SkipReason, VariableElement,
    };
    use crate::source::{CsvOptions, CsvSource, XmlSource};
    use crate::store::{MemoryStore, Operation, RemoteStore, StoreCall, StoreError};
    use crate::types::{Action, ComponentTag, DataType, TypedValue};
    use std::sync::{Arc, Mutex};

    fn csv(text: &str) -> CsvSource {
        CsvSource::parse(text, &CsvOptions::default()).unwrap()
    }

    fn sales_mapping() -> Mapping {
        Mapping::new(Action::new("sale", "transaction"), "/")
            .with_element(PathElement::new(0usize, ComponentTag::Who, DataType::String, "seller"))
            .with_element(PathElement::new(1usize, ComponentTag::What, DataType::Integer, "amount"))
            .with_element(
                PathElement::new(2usize, ComponentTag::When, DataType::Timestamp, "date").optional(),
            )
    }

    /// Remembers every skip reason, in order.
    #[derive(Default)]
    struct RecordingObserver {
        skipped: Mutex<Vec<(usize, SkipReason)>>,
    }

    impl RunObserver for RecordingObserver {
        fn record_skipped(&self, _mapping: &str, _root: &str, index: usize, reason: &SkipReason) {
            self.skipped.lock().unwrap().push((index, reason.clone()));
        }
    }

    // ================================================================
    // Lifecycle
    // ================================================================

    // === Scenario: connect first, close last ===
    #[tokio::test]
    async fn connects_before_and_closes_after_run() {
        let store = MemoryStore::new();
        let source = csv("alice,10,2024-01-02\nbob,20,2024-01-03\n");

        let stats = Loader::new(vec![sales_mapping()]).run(&source, &store).await.unwrap();

        let calls = store.calls();
        assert_eq!(calls.first(), Some(&StoreCall::Connect));
        assert_eq!(calls.last(), Some(&StoreCall::Close));
        assert_eq!(calls[1], StoreCall::CreateAction("sale".to_string()));
        assert!(!store.is_connected());

        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].records, 2);
        assert_eq!(stats[0].instances, 2);
        assert_eq!(stats[0].passes, 1);
    }

    // === Scenario: store is closed even when a mapping fails ===
    #[tokio::test]
    async fn closes_store_on_error_path() {
        let store = MemoryStore::new().fail_on(Operation::CreateAction);
        let source = csv("alice,10\n");

        let err = Loader::new(vec![sales_mapping()])
            .run(&source, &store)
            .await
            .unwrap_err();

        assert!(matches!(err, LoaderError::EntityCreate { ref entity, .. } if entity == "action 'sale'"));
        assert_eq!(store.calls().last(), Some(&StoreCall::Close));
    }

    // === Scenario: connect failure surfaces as a store error ===
    #[tokio::test]
    async fn connect_failure_is_store_error() {
        let store = MemoryStore::new().fail_on(Operation::Connect);
        let err = Loader::new(vec![sales_mapping()])
            .run(&csv("a,1\n"), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::Store(StoreError::Rejected { .. })));
        assert!(store.actions().is_empty());
    }

    // ================================================================
    // Determinism & topology cache
    // ================================================================

    // === Scenario: same input, same output ===
    #[tokio::test]
    async fn repeated_runs_are_identical() {
        let source = csv("alice,10,2024-01-02\nbob,x,2024-01-03\ncarol,30,\n");
        let loader = Loader::new(vec![sales_mapping()]);

        let first = MemoryStore::new();
        let second = MemoryStore::new();
        loader.run(&source, &first).await.unwrap();
        loader.run(&source, &second).await.unwrap();

        assert_eq!(first.calls(), second.calls());
        assert_eq!(first.instances(), second.instances());
        assert_eq!(first.topologies(), second.topologies());
    }

    // === Scenario: one create and one link per signature ===
    #[tokio::test]
    async fn each_signature_created_and_linked_once() {
        // rows 1 and 3 carry a date (Who,What,When); row 2 does not (Who,What)
        let source = csv("alice,10,2024-01-02\nbob,20,\ncarol,30,2024-02-01\ndave,40,\n");
        let store = MemoryStore::new();

        let stats = Loader::new(vec![sales_mapping()]).run(&source, &store).await.unwrap();

        assert_eq!(stats[0].topologies, 2);
        assert_eq!(store.topologies().len(), 2);
        assert_eq!(store.links().len(), 2);
        assert_eq!(
            store.count_calls(|c| matches!(c, StoreCall::CreateTopology(_))),
            2
        );

        let instances = store.instances();
        assert_eq!(instances.len(), 4);
        assert_eq!(instances[0].topology_id, instances[2].topology_id);
        assert_eq!(instances[1].topology_id, instances[3].topology_id);
        assert_ne!(instances[0].topology_id, instances[1].topology_id);
    }

    // === Scenario: signatures ignore labels ===
    #[tokio::test]
    async fn fallback_with_same_components_reuses_topology() {
        let mapping = Mapping::new(Action::new("visit", "event"), "/")
            .with_element(PathElement::new(0usize, ComponentTag::Who, DataType::String, "patient"))
            .with_element(PathElement::new(1usize, ComponentTag::Where, DataType::String, "ward").with_allow_void(false))
            .with_fallback(PathElement::new(0usize, ComponentTag::Who, DataType::String, "visitor"))
            .with_fallback(FixedElement::new(
                ComponentTag::Where,
                TypedValue::String("lobby".into()),
                "location",
            ));
        let store = MemoryStore::new();

        Loader::new(vec![mapping])
            .run(&csv("ann,north\nben,\n"), &store)
            .await
            .unwrap();

        assert_eq!(store.topologies().len(), 1);
        assert_eq!(store.topologies()[0].labels, vec!["patient", "ward"]);
        let instances = store.instances();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].topology_id, instances[1].topology_id);
        assert_eq!(instances[1].data[1].value, TypedValue::String("lobby".into()));
    }

    // === Scenario: link failure does not stop the run ===
    #[tokio::test]
    async fn link_failure_is_reported_not_returned() {
        let store = MemoryStore::new().fail_on(Operation::Link);
        let observer = Arc::new(CountingObserver::new());

        let stats = Loader::new(vec![sales_mapping()])
            .with_observer(observer.clone())
            .run(&csv("alice,10,\nbob,20,\n"), &store)
            .await
            .unwrap();

        assert_eq!(stats[0].link_failures, 1);
        assert_eq!(observer.link_failures(), 1);
        assert_eq!(store.instances().len(), 2);
        assert_eq!(store.count_calls(|c| matches!(c, StoreCall::Link(..))), 1);
    }

    // === Scenario: topology create failure aborts with the signature ===
    #[tokio::test]
    async fn topology_create_failure_names_signature() {
        let store = MemoryStore::new().fail_on(Operation::CreateTopology);
        let err = Loader::new(vec![sales_mapping()])
            .run(&csv("alice,10,2024-01-02\n"), &store)
            .await
            .unwrap_err();

        match err {
            LoaderError::EntityCreate { mapping, entity, .. } => {
                assert_eq!(mapping, "sale");
                assert_eq!(entity, format!("topology '{}'", Signature::from_components(&[
                    ComponentTag::Who,
                    ComponentTag::What,
                    ComponentTag::When
                ])));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(store.batches().is_empty());
    }

    // ================================================================
    // Element sets
    // ================================================================

    // === Scenario: fewer than two triples is never an instance ===
    #[tokio::test]
    async fn triple_count_floor() {
        let mapping = Mapping::new(Action::new("ping", "event"), "/")
            .with_element(PathElement::new(0usize, ComponentTag::Who, DataType::String, "host"))
            .with_element(PathElement::new(1usize, ComponentTag::When, DataType::Timestamp, "at").optional());
        let store = MemoryStore::new();
        let observer = Arc::new(RecordingObserver::default());

        let stats = Loader::new(vec![mapping])
            .with_observer(observer.clone())
            .run(&csv("web1,2024-05-01T10:00:00\nweb2,\n"), &store)
            .await
            .unwrap();

        assert_eq!(stats[0].instances, 1);
        assert_eq!(stats[0].skipped, 1);
        let skipped = observer.skipped.lock().unwrap();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].0, 1);
        assert!(matches!(skipped[0].1, SkipReason::TooFewTriples { count: 1, .. }));
    }

    // === Scenario: fallback only after primary fails, no leakage ===
    #[tokio::test]
    async fn fallback_precedence_without_leakage() {
        let mapping = Mapping::new(Action::new("order", "event"), "/")
            .with_element(PathElement::new(0usize, ComponentTag::Who, DataType::String, "buyer"))
            .with_element(PathElement::new(1usize, ComponentTag::What, DataType::Integer, "qty"))
            .with_fallback(PathElement::new(2usize, ComponentTag::Where, DataType::String, "depot"))
            .with_fallback(FixedElement::new(
                ComponentTag::What,
                TypedValue::String("unknown".into()),
                "qty",
            ));
        let store = MemoryStore::new();

        let stats = Loader::new(vec![mapping])
            .run(&csv("ann,3,east\nben,lots,west\n"), &store)
            .await
            .unwrap();

        assert_eq!(stats[0].fallback_used, 1);
        let instances = store.instances();
        assert_eq!(instances.len(), 2);

        // primary row: exactly the primary triples
        assert_eq!(instances[0].data.len(), 2);
        assert_eq!(instances[0].data[1].value, TypedValue::Integer(3));

        // fallback row: no trace of the primary's successful "ben" triple
        assert_eq!(instances[1].data.len(), 2);
        assert_eq!(instances[1].data[0].value, TypedValue::String("west".into()));
        let topology = store
            .topologies()
            .into_iter()
            .find(|t| t.id == Some(instances[1].topology_id))
            .unwrap();
        assert_eq!(topology.components, vec![ComponentTag::Where, ComponentTag::What]);
    }

    // === Scenario: required missing field with void allowed ===
    #[tokio::test]
    async fn void_field_keeps_structural_slot() {
        let mapping = Mapping::new(Action::new("reading", "measurement"), "/")
            .with_element(PathElement::new(0usize, ComponentTag::Where, DataType::String, "sensor"))
            .with_element(PathElement::new(1usize, ComponentTag::What, DataType::Decimal, "value"))
            .with_element(PathElement::new(2usize, ComponentTag::When, DataType::Timestamp, "at"));
        let store = MemoryStore::new();

        Loader::new(vec![mapping])
            .run(&csv("s1,n/a,2024-03-04 05:06:07\n"), &store)
            .await
            .unwrap();

        let instances = store.instances();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].data.len(), 3);
        assert_eq!(instances[0].data[1].value, TypedValue::Void);

        let wire = serde_json::to_value(&instances[0]).unwrap();
        assert_eq!(wire["data"][1]["value"], "Void");
        assert_eq!(wire["data"][1]["datatype"], "Void");
    }

    // === Scenario: combined name fields ===
    #[tokio::test]
    async fn combination_element_builds_one_string() {
        let mapping = Mapping::new(Action::new("signup", "event"), "/")
            .with_element(CombinationElement::new(
                vec![0usize.into(), 1usize.into()],
                ComponentTag::Who,
                "name",
            ))
            .with_element(PathElement::new(2usize, ComponentTag::When, DataType::Timestamp, "at"));
        let store = MemoryStore::new();

        Loader::new(vec![mapping])
            .run(&csv("Ada,Lovelace,1843-07-01\n,,1900-01-01\n"), &store)
            .await
            .unwrap();

        let instances = store.instances();
        assert_eq!(instances[0].data[0].value, TypedValue::String("Ada Lovelace".into()));
        assert_eq!(instances[1].data[0].value, TypedValue::Void);
    }

    // ================================================================
    // Batching
    // ================================================================

    async fn load_rows(rows: usize, batch_size: usize) -> MemoryStore {
        let text: String = (0..rows).map(|i| format!("user{},{}\n", i, i)).collect();
        let mapping = Mapping::new(Action::new("tick", "event"), "/")
            .with_element(PathElement::new(0usize, ComponentTag::Who, DataType::String, "user"))
            .with_element(PathElement::new(1usize, ComponentTag::What, DataType::Integer, "n"))
            .with_batch_size(batch_size);
        let store = MemoryStore::new();
        Loader::new(vec![mapping]).run(&csv(&text), &store).await.unwrap();
        store
    }

    // === Scenario: M instances in batches of N ===
    #[tokio::test]
    async fn batch_boundaries() {
        let store = load_rows(250, 100).await;
        let sizes: Vec<usize> = store.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);

        let store = load_rows(200, 100).await;
        let sizes: Vec<usize> = store.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![100, 100]);

        let store = load_rows(7, 100).await;
        let sizes: Vec<usize> = store.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![7]);
    }

    // === Scenario: instance order survives batching ===
    #[tokio::test]
    async fn batches_preserve_record_order() {
        let store = load_rows(5, 2).await;
        let values: Vec<TypedValue> = store
            .instances()
            .iter()
            .map(|i| i.data[1].value.clone())
            .collect();
        assert_eq!(values, (0..5).map(TypedValue::Integer).collect::<Vec<_>>());
    }

    // === Scenario: failed flush aborts without retry ===
    #[tokio::test]
    async fn batch_flush_failure_is_fatal() {
        let text: String = (0..5).map(|i| format!("u{},{}\n", i, i)).collect();
        let mapping = Mapping::new(Action::new("tick", "event"), "/")
            .with_element(PathElement::new(0usize, ComponentTag::Who, DataType::String, "user"))
            .with_element(PathElement::new(1usize, ComponentTag::What, DataType::Integer, "n"))
            .with_batch_size(2);
        let store = MemoryStore::new().fail_on_nth(Operation::BatchCreate, 2);

        let err = Loader::new(vec![mapping]).run(&csv(&text), &store).await.unwrap_err();

        assert!(matches!(err, LoaderError::BatchFlush { count: 2, .. }));
        assert_eq!(store.count_calls(|c| matches!(c, StoreCall::BatchCreate(_))), 2);
        assert_eq!(store.batches().len(), 1);
    }

    // ================================================================
    // Loop variables
    // ================================================================

    fn quarterly_report() -> XmlSource {
        let mut xml = String::from(
            "<report><regions><region name=\"north\">\
             <year>2019</year><year>2020</year>\
             <quarter>Q1</quarter><quarter>Q2</quarter><quarter>Q3</quarter>\
             </region></regions><data>",
        );
        for year in ["2019", "2020"] {
            xml.push_str(&format!("<year v=\"{}\">", year));
            for (n, quarter) in ["Q1", "Q2", "Q3"].iter().enumerate() {
                xml.push_str(&format!(
                    "<q v=\"{}\"><sale><amount>{}{}</amount></sale></q>",
                    quarter,
                    &year[2..],
                    n
                ));
            }
            xml.push_str("</year>");
        }
        xml.push_str("</data></report>");
        XmlSource::parse(&xml).unwrap()
    }

    // === Scenario: 2 years x 3 quarters in one scope ===
    #[tokio::test]
    async fn loop_variable_product_within_scope() {
        let mapping = Mapping::new(Action::new("quarterly", "summary"), "data/year[@v='{0}']/q[@v='{0.1}']")
            .with_loop_variable(LoopVariable::new("regions/region", vec!["year".into(), "quarter".into()]))
            .with_element(VariableElement::new(ComponentTag::When, DataType::Integer, "year", 0, 0))
            .with_element(VariableElement::new(ComponentTag::When, DataType::String, "quarter", 0, 1))
            .with_element(PathElement::new("amount", ComponentTag::What, DataType::Integer, "amount"));
        let store = MemoryStore::new();

        let stats = Loader::new(vec![mapping])
            .run(&quarterly_report(), &store)
            .await
            .unwrap();

        assert_eq!(stats[0].passes, 6);
        let rows: Vec<(TypedValue, TypedValue, TypedValue)> = store
            .instances()
            .iter()
            .map(|i| (i.data[0].value.clone(), i.data[1].value.clone(), i.data[2].value.clone()))
            .collect();
        assert_eq!(rows.len(), 6);
        assert_eq!(
            rows[0],
            (
                TypedValue::Integer(2019),
                TypedValue::String("Q1".into()),
                TypedValue::Integer(190)
            )
        );
        assert_eq!(rows[2].1, TypedValue::String("Q3".into()));
        assert_eq!(
            rows[5],
            (
                TypedValue::Integer(2020),
                TypedValue::String("Q3".into()),
                TypedValue::Integer(202)
            )
        );
        assert_eq!(store.topologies().len(), 1);
    }

    // === Scenario: bound value containing '/' lands in a root predicate ===
    #[tokio::test]
    async fn loop_variable_value_with_slash_in_root() {
        let source = XmlSource::parse(
            "<report><seasons><s><k>19/20</k></s></seasons>\
             <data><y v=\"19/20\"><row><team>ajax</team><pts>81</pts></row></y></data></report>",
        )
        .unwrap();
        let mapping = Mapping::new(Action::new("season", "standings"), "data/y[@v='{0}']")
            .with_loop_variable(LoopVariable::new("seasons/s", vec!["k".into()]))
            .with_element(VariableElement::new(ComponentTag::When, DataType::String, "season", 0, 0))
            .with_element(PathElement::new("team", ComponentTag::Who, DataType::String, "team"))
            .with_element(PathElement::new("pts", ComponentTag::What, DataType::Integer, "points"));
        let store = MemoryStore::new();

        let stats = Loader::new(vec![mapping]).run(&source, &store).await.unwrap();

        assert_eq!(stats[0].instances, 1);
        assert_eq!(store.instances()[0].data[0].value, TypedValue::String("19/20".into()));
    }

    // === Scenario: survey counts without touching the store ===
    #[test]
    fn survey_counts_combinations_and_records() {
        let mapping = Mapping::new(Action::new("quarterly", "summary"), "data/year[@v='{0}']/q[@v='{0.1}']")
            .with_loop_variable(LoopVariable::new("regions/region", vec!["year".into(), "quarter".into()]))
            .with_element(VariableElement::new(ComponentTag::When, DataType::Integer, "year", 0, 0))
            .with_element(PathElement::new("amount", ComponentTag::What, DataType::Integer, "amount"));

        let survey = Loader::new(vec![mapping]).survey(&quarterly_report()).unwrap();
        assert_eq!(survey.len(), 1);
        assert_eq!(survey[0].combinations, 6);
        assert_eq!(survey[0].records, 6);
    }

    // === Scenario: root that resolves to nothing ===
    #[tokio::test]
    async fn unresolvable_root_is_invalid_locator() {
        let mapping = Mapping::new(Action::new("missing", "event"), "nowhere")
            .with_element(PathElement::new("a", ComponentTag::Who, DataType::String, "a"))
            .with_element(PathElement::new("b", ComponentTag::What, DataType::String, "b"));
        let store = MemoryStore::new();

        let err = Loader::new(vec![mapping])
            .run(&quarterly_report(), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::InvalidLocator { ref locator, .. } if locator == "nowhere"));
        assert_eq!(store.calls().last(), Some(&StoreCall::Close));
    }

    // ================================================================
    // Multiple mappings
    // ================================================================

    fn broken_mapping() -> Mapping {
        Mapping::new(Action::new("broken", "event"), "rows")
            .with_element(PathElement::new(0usize, ComponentTag::Who, DataType::String, "a"))
            .with_element(PathElement::new(1usize, ComponentTag::What, DataType::String, "b"))
    }

    // === Scenario: first failing mapping stops the run ===
    #[tokio::test]
    async fn run_stops_at_first_failing_mapping() {
        let store = MemoryStore::new();
        let err = Loader::new(vec![sales_mapping(), broken_mapping(), sales_mapping().with_name("again")])
            .run(&csv("alice,1\n"), &store)
            .await
            .unwrap_err();

        assert_eq!(err.mapping(), Some("broken"));
        let names: Vec<String> = store.actions().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["sale", "broken"]);
        assert_eq!(store.instances().len(), 1);
    }

    // === Scenario: isolated mappings continue past a failure ===
    #[tokio::test]
    async fn run_each_isolates_failures() {
        let store = MemoryStore::new();
        let results = Loader::new(vec![sales_mapping(), broken_mapping(), sales_mapping().with_name("again")])
            .run_each(&csv("alice,1\n"), &store)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(LoaderError::InvalidLocator { .. })));
        assert_eq!(results[2].as_ref().unwrap().mapping, "again");
        assert_eq!(store.instances().len(), 2);
        assert_eq!(store.calls().last(), Some(&StoreCall::Close));
    }

    // === Scenario: close failure after isolated mappings ===
    #[tokio::test]
    async fn run_each_keeps_results_when_close_fails() {
        let store = MemoryStore::new().fail_on(Operation::Close);
        let results = Loader::new(vec![sales_mapping(), broken_mapping()])
            .run_each(&csv("alice,1\n"), &store)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().instances, 1);
        assert!(results[1].is_err());
        assert_eq!(store.calls().last(), Some(&StoreCall::Close));
    }

    // === Scenario: close failure still fails a plain run ===
    #[tokio::test]
    async fn run_reports_close_failure() {
        let store = MemoryStore::new().fail_on(Operation::Close);
        let err = Loader::new(vec![sales_mapping()])
            .run(&csv("alice,1\n"), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::Store(StoreError::Rejected { .. })));
    }

    // ================================================================
    // Cancellation
    // ================================================================

    // === Scenario: cancelled before the run starts ===
    #[tokio::test]
    async fn cancelled_token_stops_before_any_pass() {
        let token = CancellationToken::new();
        token.cancel();
        let store = MemoryStore::new();

        let err = Loader::new(vec![sales_mapping()])
            .with_cancellation(token)
            .run(&csv("alice,1\n"), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, LoaderError::Cancelled));
        assert!(store.actions().is_empty());
        assert_eq!(store.calls(), vec![StoreCall::Connect, StoreCall::Close]);
    }

    /// Cancels the run once the first batch has been flushed.
    struct CancelAfterFlush(CancellationToken);

    impl RunObserver for CancelAfterFlush {
        fn batch_flushed(&self, _mapping: &str, _count: usize) {
            self.0.cancel();
        }
    }

    // === Scenario: cancellation between passes keeps committed batches ===
    #[tokio::test]
    async fn cancellation_between_passes() {
        let token = CancellationToken::new();
        let mapping = Mapping::new(Action::new("quarterly", "summary"), "data/year[@v='{0}']/q[@v='{0.1}']")
            .with_loop_variable(LoopVariable::new("regions/region", vec!["year".into(), "quarter".into()]))
            .with_element(VariableElement::new(ComponentTag::When, DataType::Integer, "year", 0, 0))
            .with_element(PathElement::new("amount", ComponentTag::What, DataType::Integer, "amount"))
            .with_batch_size(1);
        let store = MemoryStore::new();

        let err = Loader::new(vec![mapping])
            .with_observer(Arc::new(CancelAfterFlush(token.clone())))
            .with_cancellation(token)
            .run(&quarterly_report(), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, LoaderError::Cancelled));
        assert_eq!(store.batches().len(), 1);
        assert!(!store.is_connected());
    }

    #[tokio::test]
    async fn memory_store_requires_connect() {
        let store = MemoryStore::new();
        let result = store.create_action(&Action::new("x", "y")).await;
        assert!(matches!(result, Err(StoreError::NotConnected)));
    }
}
