// Graph transformation flows: narrowing through Pi nodes, pipeline-driven
// lowering of self-replacing call targets, and emission readiness.

use midge::builder::{build, BuilderConfig};
use midge::canonicalize::CanonicalizerPhase;
use midge::error::GraphInternalError;
use midge::graph::Graph;
use midge::lower::{check_emittable, LoweringPhase};
use midge::node::{InvokeKind, Node, NodeKind};
use midge::phase::{PhaseContext, PhaseFactories, PhaseRunner};
use midge::registry::MethodRegistry;
use midge::stamp::Stamp;
use midge::verify::VerifyPhase;

const DOC: &str = r#"{
    "types": [
        { "name": "String", "final": true },
        { "name": "String[]", "component": "String" },
        { "name": "CharSequence" }
    ],
    "classes": [
        {
            "name": "util.Text",
            "methods": [
                {
                    "name": "narrow",
                    "static": true,
                    "params": [ { "kind": "Object" } ],
                    "return": { "kind": "Object", "ty": "String" },
                    "body": { "ops": [
                        { "op": "param", "index": 0 },
                        { "op": "pi", "object": 0, "class": "String" },
                        { "op": "return", "value": 1 }
                    ] }
                },
                {
                    "name": "firstChar",
                    "static": true,
                    "params": [ { "kind": "Object", "ty": "String[]" } ],
                    "return": { "kind": "Object" },
                    "body": { "ops": [
                        { "op": "param", "index": 0 },
                        { "op": "array_length", "array": 0 },
                        { "op": "const", "value": { "Int": 0 } },
                        { "op": "load_indexed", "array": 0, "index": 2, "length": 1, "elem": "Object" },
                        { "op": "return", "value": 3 }
                    ] }
                },
                {
                    "name": "slow", "static": true,
                    "params": [ { "kind": "Int" } ], "return": { "kind": "Int" },
                    "body": { "ops": [ { "op": "param", "index": 0 }, { "op": "return", "value": 0 } ] }
                },
                {
                    "name": "fast", "static": true,
                    "params": [ { "kind": "Int" } ], "return": { "kind": "Long" },
                    "body": { "ops": [ { "op": "param", "index": 0 }, { "op": "return", "value": 0 } ] }
                }
            ]
        }
    ]
}"#;

fn loaded() -> MethodRegistry {
    let mut reg = MethodRegistry::new();
    reg.load_json(DOC).unwrap();
    reg
}

#[test]
fn pi_narrows_an_unknown_object_and_sticks() {
    let reg = loaded();
    let m = reg.lookup_qualified("util.Text", "narrow").unwrap();
    let mut graph = build(&reg, m, &BuilderConfig::default()).unwrap();

    let runner = {
        let mut r = PhaseRunner::new();
        r.push(Box::new(VerifyPhase));
        r.push(Box::new(CanonicalizerPhase));
        r
    };
    let cx = PhaseContext::new(&reg);
    runner.run(&mut graph, &cx).unwrap();

    // The parameter's stamp is unknown, the Pi declares String: the Pi
    // keeps its narrowed stamp and is not removed.
    let pis = graph.nodes_matching(|k| matches!(k, NodeKind::Pi { .. }));
    assert_eq!(pis.len(), 1);
    assert_eq!(graph[pis[0]].stamp(), &Stamp::object_typed("String"));
}

#[test]
fn load_from_final_component_becomes_exact() {
    let reg = loaded();
    let m = reg.lookup_qualified("util.Text", "firstChar").unwrap();
    let mut graph = build(&reg, m, &BuilderConfig::default()).unwrap();
    midge::canonicalize::canonicalize(&mut graph, reg.types()).unwrap();

    let loads = graph.nodes_matching(|k| matches!(k, NodeKind::LoadIndexed { .. }));
    assert_eq!(graph[loads[0]].stamp(), &Stamp::object_exact("String"));
}

#[test]
fn lowering_pipeline_makes_the_graph_emittable() {
    let reg = loaded();
    let slow = reg.lookup_qualified("util.Text", "slow").unwrap();
    let fast = reg.lookup_qualified("util.Text", "fast").unwrap();

    let mut graph = Graph::new("t");
    let a = graph.add(Node::param(0, Stamp::int())).unwrap();
    let target = graph
        .add(Node::self_replacing_call_target(
            InvokeKind::Static,
            slow,
            vec![a],
            fast,
            vec![a],
            Stamp::long(),
        ))
        .unwrap();
    let invoke = graph.add(Node::invoke(target, Stamp::int())).unwrap();
    graph.add(Node::ret(Some(invoke))).unwrap();

    // Before lowering, code generation must refuse the graph.
    let err = check_emittable(&graph).unwrap_err();
    assert!(matches!(err, GraphInternalError::ShouldNotReachHere(_)));

    let runner = {
        let mut r = PhaseRunner::new();
        r.push(Box::new(LoweringPhase));
        r.push(Box::new(VerifyPhase));
        r
    };
    let cx = PhaseContext::new(&reg);
    runner.run(&mut graph, &cx).unwrap();

    check_emittable(&graph).unwrap();
    let new_target = graph[invoke].invoke_target().unwrap();
    assert_eq!(graph[new_target].target_method().unwrap().1, fast);
    assert_eq!(graph[invoke].stamp(), &Stamp::long());
}

#[test]
fn default_factories_build_the_standard_inliner() {
    let factories = PhaseFactories::new();
    assert_eq!(factories.create_inlining_phase().name(), "inline");
}
