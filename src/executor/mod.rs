//! Executors: drive a built [`Dag`] of [`CallSpec`]s to completion,
//! sequentially or in parallel over a Tokio blocking-task pool (§4.5).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, instrument};

use crate::builder::{CallSpec, WriteMode};
use crate::dag::{Dag, NodeId};
use crate::environment::Environment;
use crate::error::{EngineError, RequiredBy, Result};
use crate::namespace::Namespace;
use crate::value::Value;

fn gather_args(call: &CallSpec, ns: &Namespace) -> HashMap<String, Value> {
    let mut args = HashMap::with_capacity(call.arg_names.len());
    for name in &call.arg_names {
        // Bounded by the layer this call was built under (§4.5): an
        // unbounded `ns.get` would also see sibling scopes' defaults
        // layers pushed later, at a higher index.
        if let Some((_, v)) = ns.get_bounded(name, call.read_index) {
            args.insert((*name).to_string(), v.clone());
        } else if let Some(default) = call.provider.param(name).and_then(|p| p.default.clone()) {
            args.insert((*name).to_string(), default);
        }
    }
    args
}

fn invoke(call: &CallSpec, ns: &Namespace, env: &Environment) -> Result<Value> {
    let mut args = gather_args(call, ns);
    if let Some(prepare) = &call.provider.prepare {
        args.extend(prepare(&call.nsspec, ns, env));
    }
    let result = (call.provider.func)(&args)?;
    Ok(match &call.provider.final_action {
        Some(final_action) => final_action(result, &args),
        None => result,
    })
}

fn store(ns: &mut Namespace, call: &CallSpec, value: Value) -> Result<()> {
    match call.write_mode {
        WriteMode::SetUnique => {
            let already_set = ns.layer(call.write_index).map(|l| l.contains_key(&call.result_name)).unwrap_or(false);
            if already_set {
                return Err(EngineError::ResourceError {
                    name: call.result_name.clone(),
                    message: "value already set at this namespace layer (SET_UNIQUE)".to_string(),
                    required_by: RequiredBy::default(),
                });
            }
            ns.write_at(&call.result_name, value, call.write_index);
        }
        WriteMode::SetOrUpdate => ns.write_at(&call.result_name, value, call.write_index),
        WriteMode::Append => {
            let existing = ns.layer_mut(call.write_index).and_then(|l| l.get(&call.result_name).cloned());
            match existing {
                Some(Value::List(mut items)) => {
                    items.push(value);
                    ns.write_at(&call.result_name, Value::List(items), call.write_index);
                }
                Some(_) => {
                    return Err(EngineError::ResourceError {
                        name: call.result_name.clone(),
                        message: "cannot APPEND: existing value is not a list".to_string(),
                        required_by: RequiredBy::default(),
                    })
                }
                None => ns.write_at(&call.result_name, Value::List(vec![value]), call.write_index),
            }
        }
    }
    Ok(())
}

/// Run every node of `dag` in topological order on the current thread.
#[instrument(skip(dag, ns, env))]
pub fn run_sequential(dag: &Dag<CallSpec>, ns: &mut Namespace, env: &Environment) -> Result<()> {
    for id in dag.topological_iter() {
        let call = dag.value(id).expect("topological order only yields live node ids").clone();
        debug!(call = call.name.as_str(), "executing");
        let result = invoke(&call, ns, env)?;
        store(ns, &call, result)?;
    }
    Ok(())
}

/// Run `dag` with a cooperative scheduler dispatching onto Tokio's
/// blocking-task pool: one `spawn_blocking` call per runnable
/// `CallSpec`, driven by the DAG's dependency resolver (§4.5).
#[instrument(skip(dag, ns, env))]
pub async fn run_parallel(dag: &Dag<CallSpec>, ns: Arc<Mutex<Namespace>>, env: Arc<Environment>) -> Result<()> {
    let mut resolver = dag.dependency_resolver();
    let mut join_set: JoinSet<Result<(NodeId, CallSpec, Value)>> = JoinSet::new();

    let dispatch = |join_set: &mut JoinSet<Result<(NodeId, CallSpec, Value)>>, id: NodeId| {
        let call = dag.value(id).expect("resolver only yields live node ids").clone();
        let ns = ns.clone();
        let env = env.clone();
        join_set.spawn_blocking(move || {
            let guard = ns.blocking_lock();
            let result = invoke(&call, &guard, &env)?;
            drop(guard);
            Ok((id, call, result))
        });
    };

    for id in resolver.ready() {
        dispatch(&mut join_set, id);
    }

    while let Some(joined) = join_set.join_next().await {
        let (id, call, value) = joined.map_err(|e| EngineError::Join(e.to_string()))??;
        {
            let mut guard = ns.lock().await;
            store(&mut guard, &call, value)?;
        }
        debug!(call = call.name.as_str(), "completed");
        for next in resolver.complete(id) {
            dispatch(&mut join_set, next);
        }
    }

    if !resolver.is_finished() {
        return Err(EngineError::Cancelled);
    }
    Ok(())
}

/// Run the parallel driver under a whole-run timeout (§5 "Cancellation
/// & timeouts"). On timeout, outstanding blocking tasks are left to
/// finish; `JoinSet`'s `Drop` aborts anything still pending once this
/// future itself is dropped.
pub async fn run_parallel_with_timeout(dag: &Dag<CallSpec>, ns: Arc<Mutex<Namespace>>, env: Arc<Environment>, timeout: std::time::Duration) -> Result<()> {
    match tokio::time::timeout(timeout, run_parallel(dag, ns, env)).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CallSpec;
    use crate::namespace::{Layer, SpecElement};
    use crate::provider::{Param, ProviderFn};

    fn make_call(id: usize, name: &'static str, args: Vec<&'static str>, write_index: usize, func: impl Fn(&HashMap<String, Value>) -> Result<Value> + Send + Sync + 'static) -> CallSpec {
        let provider = ProviderFn::new(name, args.iter().map(|a| Param::required(a)).collect(), func);
        CallSpec {
            id,
            name: name.to_string(),
            nsspec: crate::namespace::Spec::from(vec![SpecElement::Name(name.to_string())]),
            write_index,
            read_index: write_index,
            result_name: name.to_string(),
            write_mode: WriteMode::SetUnique,
            provider: Arc::new(provider),
            arg_names: args,
        }
    }

    #[test]
    fn gather_args_ignores_a_sibling_scopes_defaults_layer() {
        // Layer 1 stands in for one call node's defaults layer, layer 2
        // for a sibling's, pushed later at a higher index. A call built
        // under layer 1 (read_index == 1) must not see layer 2's "x".
        let mut ns = Namespace::new(Layer::new());
        let mut layer_a = Layer::new();
        layer_a.insert("x".to_string(), Value::int(100));
        ns.push(layer_a);
        let mut layer_b = Layer::new();
        layer_b.insert("x".to_string(), Value::int(200));
        ns.push(layer_b);

        let call = make_call(0, "c", vec!["x"], 1, |a| Ok(a["x"].clone()));
        let args = gather_args(&call, &ns);
        assert_eq!(args["x"], Value::int(100));
    }

    #[test]
    fn sequential_diamond_executes_in_dependency_order() {
        let mut dag: Dag<CallSpec> = Dag::new();
        let f = make_call(0, "f", vec![], 0, |_| Ok(Value::int(1)));
        let g = make_call(1, "g", vec!["f"], 0, |a| Ok(Value::int(a["f"].as_i64().unwrap() + 1)));
        let h = make_call(2, "h", vec!["f"], 0, |a| Ok(Value::int(a["f"].as_i64().unwrap() + 2)));
        let m = make_call(3, "m", vec!["g", "h"], 0, |a| Ok(Value::int(a["g"].as_i64().unwrap() + a["h"].as_i64().unwrap())));

        dag.add(f.clone(), &[], &[]).unwrap();
        dag.add(g.clone(), &[f.clone()], &[]).unwrap();
        dag.add(h.clone(), &[f], &[]).unwrap();
        dag.add(m, &[g, h], &[]).unwrap();

        let mut ns = Namespace::new(Layer::new());
        let env = Environment::default();
        run_sequential(&dag, &mut ns, &env).unwrap();

        assert_eq!(ns.get("m").unwrap().1.as_i64(), Some(1 + 1 + 1 + 2));
    }

    #[tokio::test]
    async fn parallel_diamond_matches_sequential() {
        let mut dag: Dag<CallSpec> = Dag::new();
        let f = make_call(0, "f", vec![], 0, |_| Ok(Value::int(10)));
        let g = make_call(1, "g", vec!["f"], 0, |a| Ok(Value::int(a["f"].as_i64().unwrap() * 2)));
        let h = make_call(2, "h", vec!["f"], 0, |a| Ok(Value::int(a["f"].as_i64().unwrap() * 3)));
        let m = make_call(3, "m", vec!["g", "h"], 0, |a| Ok(Value::int(a["g"].as_i64().unwrap() + a["h"].as_i64().unwrap())));

        dag.add(f.clone(), &[], &[]).unwrap();
        dag.add(g.clone(), &[f.clone()], &[]).unwrap();
        dag.add(h.clone(), &[f], &[]).unwrap();
        dag.add(m, &[g, h], &[]).unwrap();

        let ns = Arc::new(Mutex::new(Namespace::new(Layer::new())));
        let env = Arc::new(Environment::default());
        run_parallel(&dag, ns.clone(), env).await.unwrap();

        let guard = ns.lock().await;
        assert_eq!(guard.get("m").unwrap().1.as_i64(), Some(50));
    }
}
