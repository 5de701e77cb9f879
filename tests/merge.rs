use pretty_assertions::assert_eq;
use refeval as rf;
use rf::{BoxError, Evaluator, KeyConflict, MergeOptions, Node, Strategy};
use serde_json::json;

fn n(v: serde_json::Value) -> Node {
    Node::from(v)
}

fn merge_scope() -> Evaluator {
    Evaluator::builder()
        .local_scope(n(json!({
            "base_tags": ["base", "common"],
            "defaults": {"deploy": {"replicas": 1, "resources": {"cpu": "100m", "memory": "128Mi"}}},
            "prod": {"deploy": {"replicas": 3, "resources": {"cpu": "500m"}}},
            "extra_tags": ["extra", "additional"]
        })))
        .global_scope(n(json!({
            "envs": {"prod": {"deploy": {"resources": {"memory": "512Mi"}, "autoscaling": true}}}
        })))
        .build()
}

fn eval(doc: serde_json::Value, ev: &Evaluator) -> Node {
    ev.eval(&n(doc)).unwrap()
}

#[test]
fn test_shorthand_object_merge() {
    let out = eval(
        json!({"deploy": {"$merge": [{"host": "localhost", "port": 80}, {"port": 8080, "proto": "https"}]}}),
        &Evaluator::new(),
    );
    assert_eq!(out, n(json!({"deploy": {"host": "localhost", "port": 8080, "proto": "https"}})));
}

#[test]
fn test_shorthand_array_merge() {
    let out = eval(json!({"tags": {"$merge": [["auth", "logging"], ["metrics", "tracing"]]}}), &Evaluator::new());
    assert_eq!(out, n(json!({"tags": ["auth", "logging", "metrics", "tracing"]})));
}

#[test]
fn test_deep_merge_by_default() {
    let out = eval(
        json!({"deploy": {"$merge": [{"$ref": "local::defaults.deploy"}, {"$ref": "local::prod.deploy"}]}}),
        &merge_scope(),
    );
    assert_eq!(
        out,
        n(json!({"deploy": {"replicas": 3, "resources": {"cpu": "500m", "memory": "128Mi"}}}))
    );
}

#[test]
fn test_explicit_deep_strategy_across_scopes() {
    let out = eval(
        json!({"deploy": {"$merge": {"strategy": "deep", "sources": [
            {"$ref": "local::defaults.deploy"},
            {"$ref": "global::envs.prod.deploy"},
            {"retries": 5}
        ]}}}),
        &merge_scope(),
    );
    assert_eq!(
        out,
        n(json!({"deploy": {
            "replicas": 1,
            "resources": {"cpu": "100m", "memory": "512Mi"},
            "autoscaling": true,
            "retries": 5
        }}))
    );
}

#[test]
fn test_shallow_strategy() {
    let out = eval(
        json!({"deploy": {"$merge": {"strategy": "shallow", "sources": [
            {"$ref": "local::defaults.deploy"},
            {"$ref": "local::prod.deploy"}
        ]}}}),
        &merge_scope(),
    );
    assert_eq!(out, n(json!({"deploy": {"replicas": 3, "resources": {"cpu": "500m"}}})));
}

#[test]
fn test_key_conflict_first_and_error() {
    let out = eval(
        json!({"config": {"$merge": {"key_conflict": "first", "sources": [{"port": 8080}, {"port": 9090}, {"host": "localhost"}]}}}),
        &Evaluator::new(),
    );
    assert_eq!(out, n(json!({"config": {"port": 8080, "host": "localhost"}})));

    let err = Evaluator::new()
        .eval(&n(json!({"config": {"$merge": {"key_conflict": "error", "sources": [{"port": 8080}, {"port": 9090}]}}})))
        .unwrap_err();
    assert!(err.to_string().contains("key conflict: 'port' already exists"));
}

#[test]
fn test_unique_and_prepend_arrays() {
    let out = eval(
        json!({"tags": {"$merge": {"strategy": "unique", "sources": [{"$ref": "local::base_tags"}, ["build", "docker", "build"]]}}}),
        &merge_scope(),
    );
    assert_eq!(out, n(json!({"tags": ["base", "common", "build", "docker"]})));

    let out = eval(
        json!({"tags": {"$merge": {"strategy": "prepend", "sources": [["first", "second"], ["third", "fourth"]]}}}),
        &Evaluator::new(),
    );
    assert_eq!(out, n(json!({"tags": ["third", "fourth", "first", "second"]})));
}

#[test]
fn test_null_sources_are_skipped() {
    let ev = Evaluator::builder().local_scope(n(json!({"nullable": null}))).build();
    let out = eval(json!({"config": {"$merge": [{"$ref": "local::nullable"}, {"port": 8080}]}}), &ev);
    assert_eq!(out, n(json!({"config": {"port": 8080}})));

    let out = eval(json!({"config": {"$merge": [null, null]}}), &Evaluator::new());
    assert_eq!(out, n(json!({"config": null})));
}

#[test]
fn test_directive_bearing_payload() {
    let ev = Evaluator::builder()
        .local_scope(n(json!({
            "configs": [{"$ref": "local::base.config"}, {"name": "override"}],
            "base": {"config": {"host": "localhost", "port": 3000}}
        })))
        .build();
    let out = eval(json!({"result": {"$merge": {"$ref": "local::configs"}}}), &ev);
    assert_eq!(out, n(json!({"result": {"host": "localhost", "port": 3000, "name": "override"}})));

    let out = eval(json!({"result": {"$merge": {"strategy": "shallow", "sources": {"$ref": "local::configs"}}}}), &ev);
    assert_eq!(out, n(json!({"result": {"host": "localhost", "port": 3000, "name": "override"}})));
}

#[test]
fn test_inline_merge_inside_merge_sources() {
    let ev = Evaluator::builder()
        .local_scope(n(json!({
            "base": {"server": {"host": "localhost", "port": 8080}},
            "overrides": {"port": 9090, "ssl": true}
        })))
        .build();
    let doc = r#"
result:
  $merge:
    - name: "test-service"
    - $ref: "local::base.server!merge:<deep>"
      extra: "from-ref"
    - $ref: "local::overrides"
"#;
    let out = rf::eval_str(doc, &ev).unwrap();
    assert_eq!(
        out,
        n(json!({"result": {"name": "test-service", "host": "localhost", "port": 9090, "extra": "from-ref", "ssl": true}}))
    );
}

#[test]
fn test_use_inline_merge_inside_merge_sources() {
    let ev = Evaluator::builder()
        .local_scope(n(json!({"components": {"worker": {"type": "background", "replicas": 2}}})))
        .build();
    let doc = r#"
deployment:
  $merge:
    - metadata:
        name: "my-deployment"
    - $use: "agent(local::components.worker)"
      resources:
        cpu: "100m"
    - scaling:
        enabled: true
"#;
    let out = rf::eval_str(doc, &ev).unwrap();
    assert_eq!(
        out,
        n(json!({"deployment": {
            "metadata": {"name": "my-deployment"},
            "agent": {"type": "background", "replicas": 2},
            "resources": {"cpu": "100m"},
            "scaling": {"enabled": true}
        }}))
    );
}

#[test]
fn test_nested_inline_merge_within_merge() {
    let ev = Evaluator::builder()
        .local_scope(n(json!({
            "defaults": {"database": {"host": "localhost", "port": 5432, "pool": {"min": 5, "max": 20}}},
            "environments": {"prod": {"host": "prod-db.example.com", "pool": {"max": 50}}}
        })))
        .build();
    let doc = r#"
config:
  $merge:
    - app:
        name: "my-app"
    - database:
        $ref: "local::defaults.database!merge:<deep>"
        ssl: true
        pool:
          timeout: 30
    - database:
        $ref: "local::environments.prod"
"#;
    let out = rf::eval_str(doc, &ev).unwrap();
    assert_eq!(
        out,
        n(json!({"config": {
            "app": {"name": "my-app"},
            "database": {
                "host": "prod-db.example.com",
                "port": 5432,
                "ssl": true,
                "pool": {"min": 5, "max": 50, "timeout": 30}
            }
        }}))
    );
}

fn inline_scope() -> Evaluator {
    Evaluator::builder()
        .local_scope(n(json!({
            "test": {"data": {"foo": "bar"}},
            "defaults": {"server": {"host": "localhost", "port": 8080}},
            "arrays": {"tags": ["dev", "test"]},
            "value": "scalar",
            "nothing": null,
            "base": {"config": {"nested": {"deep": "value"}, "level1": "base"}}
        })))
        .build()
}

#[test]
fn test_inline_merge_defaults() {
    let ev = inline_scope();
    let out = rf::eval_str("foo:\n  $ref: \"local::test.data\"\n  bar: baz\n", &ev).unwrap();
    assert_eq!(out, n(json!({"foo": {"foo": "bar", "bar": "baz"}})));

    let out = rf::eval_str("myagent:\n  $use: \"agent(local::test.data)\"\n  extra: value\n", &ev).unwrap();
    assert_eq!(out, n(json!({"myagent": {"agent": {"foo": "bar"}, "extra": "value"}})));

    let out = rf::eval_str("config:\n  $ref: \"local::defaults.server\"\n  ssl: true\n", &ev).unwrap();
    assert_eq!(out, n(json!({"config": {"host": "localhost", "port": 8080, "ssl": true}})));
}

#[test]
fn test_inline_merge_option_suffixes() {
    let ev = inline_scope();
    let out = rf::eval_str(
        "server:\n  $ref: \"local::defaults.server!merge:<deep>\"\n  port: 9090\n  ssl: true\n",
        &ev,
    )
    .unwrap();
    assert_eq!(out, n(json!({"server": {"host": "localhost", "port": 9090, "ssl": true}})));

    let out = rf::eval_str(
        "result:\n  $ref: \"local::base.config!merge:<shallow>\"\n  level1: override\n  nested:\n    other: new\n",
        &ev,
    )
    .unwrap();
    assert_eq!(out, n(json!({"result": {"level1": "override", "nested": {"other": "new"}}})));

    let out = rf::eval_str(
        "config:\n  $ref: \"local::defaults.server!merge:<deep,first>\"\n  host: 0.0.0.0\n",
        &ev,
    )
    .unwrap();
    assert_eq!(out, n(json!({"config": {"host": "localhost", "port": 8080}})));

    let err = rf::eval_str(
        "config:\n  $ref: \"local::defaults.server!merge:<deep,error>\"\n  host: 0.0.0.0\n",
        &ev,
    )
    .unwrap_err();
    assert!(err.to_string().contains("key conflict: 'host' already exists"));

    let out = rf::eval_str(
        "config:\n  $ref: \"local::defaults.server!merge:<replace>\"\n  extra: ignored\n",
        &ev,
    )
    .unwrap();
    assert_eq!(out, n(json!({"config": {"host": "localhost", "port": 8080}})));
}

#[test]
fn test_inline_merge_result_kinds() {
    let ev = inline_scope();
    let err = rf::eval_str("result:\n  $ref: \"local::arrays.tags\"\n  extra: value\n", &ev).unwrap_err();
    assert!(err.to_string().contains("cannot merge array result with object siblings"));

    let err = rf::eval_str("result:\n  $ref: \"local::value\"\n  extra: value\n", &ev).unwrap_err();
    assert!(err.to_string().contains("cannot merge scalar result with siblings"));

    let out = rf::eval_str("result:\n  $ref: \"local::nothing\"\n  foo: bar\n", &ev).unwrap();
    assert_eq!(out, n(json!({"result": {"foo": "bar"}})));
}

#[test]
fn test_siblings_are_evaluated_before_merging() {
    let ev = inline_scope();
    let doc = "config:\n  $ref: \"local::defaults.server\"\n  data:\n    $ref: \"local::test.data\"\n";
    let out = rf::eval_str(doc, &ev).unwrap();
    assert_eq!(out, n(json!({"config": {"host": "localhost", "port": 8080, "data": {"foo": "bar"}}})));
}

#[test]
fn test_configured_inline_defaults() {
    let ev = Evaluator::builder()
        .local_scope(n(json!({"server": {"host": "localhost", "port": 8080}})))
        .inline_merge(MergeOptions { key_conflict: KeyConflict::First, ..MergeOptions::default() })
        .build();
    let out = rf::eval_str("s:\n  $ref: local::server\n  port: 1\n", &ev).unwrap();
    assert_eq!(out, n(json!({"s": {"host": "localhost", "port": 8080}})));

    // An explicit suffix still wins over the configured default
    let out = rf::eval_str("s:\n  $ref: local::server!merge:<deep,replace>\n  port: 1\n", &ev).unwrap();
    assert_eq!(out, n(json!({"s": {"host": "localhost", "port": 1}})));
    assert_eq!(ev.inline_merge_defaults().strategy, Strategy::Deep);
}

#[test]
fn test_transformed_use_merges_with_siblings() {
    let transform = |component: &str, node: Node| -> Result<(String, Node), BoxError> {
        let mut wrapped = rf::Mapping::new();
        wrapped.insert("wrapped".to_string(), Node::Bool(true));
        wrapped.insert("data".to_string(), node);
        Ok((format!("custom_{component}"), Node::Mapping(wrapped)))
    };
    let ev = Evaluator::builder()
        .local_scope(n(json!({"component": {"type": "base", "config": {"timeout": 30}}})))
        .transform_use(transform)
        .build();
    let doc = "service:\n  $use: \"agent(local::component)\"\n  metadata:\n    version: \"1.0\"\n";
    let out = rf::eval_str(doc, &ev).unwrap();
    assert_eq!(
        out,
        n(json!({"service": {
            "custom_agent": {"wrapped": true, "data": {"type": "base", "config": {"timeout": 30}}},
            "metadata": {"version": "1.0"}
        }}))
    );
}
