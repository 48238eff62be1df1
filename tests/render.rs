//! End-to-end rendering through roots, the scheduler and the memory host.

use std::collections::{HashMap, HashSet};
use std::sync::Once;

use proptest::prelude::*;
use serde_json::json;
use spark_fiber::{
    create_root, ComponentType, ContextId, Element, HostNodeId, HostOp, MemoryHost, Node, NodeRef,
    ReconcileError, ReconcilerConfig, Root, Scheduler, UnsupportedTagPolicy, WorkTag,
};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn setup_with(config: ReconcilerConfig) -> (Root<MemoryHost>, HostNodeId) {
    init_tracing();
    let mut host = MemoryHost::new();
    let container = host.create_container();
    (create_root(host, container, config), container)
}

fn setup() -> (Root<MemoryHost>, HostNodeId) {
    setup_with(ReconcilerConfig::default())
}

fn markup(root: &Root<MemoryHost>, container: HostNodeId) -> String {
    root.with_host(|host| host.to_markup(container))
}

fn take_ops(root: &Root<MemoryHost>) -> Vec<HostOp> {
    root.with_host_mut(|host| host.take_ops())
}

fn structural(ops: &[HostOp]) -> Vec<HostOp> {
    ops.iter().filter(|op| op.is_structural()).cloned().collect()
}

fn subtree(host: &MemoryHost, id: HostNodeId, out: &mut Vec<HostNodeId>) {
    out.push(id);
    for child in host.children(id) {
        subtree(host, *child, out);
    }
}

fn title() -> Element {
    Element::host("h1")
        .attr("title", "hello world")
        .child("hello ")
        .child(
            Element::host("span")
                .style("color", "cyan")
                .attr("className", "barClass")
                .text("world"),
        )
}

fn list(keys: &[&str]) -> Element {
    Element::host("ul").children(
        keys.iter()
            .map(|key| Node::from(Element::host("li").with_key(*key).text(*key))),
    )
}

/// Map each `li` text to its host node.
fn items(root: &Root<MemoryHost>, container: HostNodeId) -> HashMap<String, HostNodeId> {
    root.with_host(|host| {
        let ul = host.children(container)[0];
        host.children(ul)
            .iter()
            .map(|id| (host.text_content(*id), *id))
            .collect()
    })
}

// =============================================================================
// End-to-end
// =============================================================================

#[test]
fn test_end_to_end_title() {
    let (root, container) = setup();
    let mut scheduler = Scheduler::new();

    root.render(title(), &mut scheduler).unwrap();
    // Nothing happens until the scheduler runs.
    assert_eq!(markup(&root, container), "");
    assert_eq!(scheduler.pending_count(), 1);

    scheduler.run_until_idle().unwrap();
    assert_eq!(
        markup(&root, container),
        "<h1 title=\"hello world\">hello <span className=\"barClass\" style=\"color:cyan\">world</span></h1>"
    );

    root.with_host(|host| {
        let h1 = host.children(container)[0];
        let node = host.node(h1).unwrap();
        assert_eq!(node.tag(), Some("h1"));
        assert_eq!(node.attribute("title"), Some(&json!("hello world")));

        let children = host.children(h1);
        assert_eq!(children.len(), 2);
        assert_eq!(host.node(children[0]).unwrap().text.as_deref(), Some("hello "));

        let span = host.node(children[1]).unwrap();
        assert_eq!(span.tag(), Some("span"));
        assert_eq!(span.style("color"), Some(&json!("cyan")));
        assert_eq!(span.attribute("className"), Some(&json!("barClass")));
        assert_eq!(host.text_content(children[1]), "world");
        // Text collapsed into the span: no separate text node.
        assert!(host.children(children[1]).is_empty());
    });
}

#[test]
fn test_mount_attaches_subtree_once() {
    let (root, container) = setup();
    root.flush_sync(title()).unwrap();

    let ops = take_ops(&root);
    let into_container: Vec<_> = ops
        .iter()
        .filter(|op| matches!(op, HostOp::Append { parent, .. } | HostOp::InsertBefore { parent, .. } if *parent == container))
        .collect();
    assert_eq!(into_container.len(), 1);
    // The attach to the container is the last mutation of the mount.
    assert!(matches!(ops.last(), Some(HostOp::Append { parent, .. }) if *parent == container));
}

#[test]
fn test_round_trip_keeps_instances() {
    let (root, container) = setup();
    root.flush_sync(title()).unwrap();
    let first = root.with_host(|host| {
        let mut ids = Vec::new();
        subtree(host, container, &mut ids);
        ids
    });
    take_ops(&root);

    root.flush_sync(title()).unwrap();
    assert!(take_ops(&root).is_empty());

    let second = root.with_host(|host| {
        let mut ids = Vec::new();
        subtree(host, container, &mut ids);
        ids
    });
    assert_eq!(first, second);

    // Every committed host fiber points at one of the first render's nodes.
    let known: HashSet<_> = first.into_iter().collect();
    let host_fibers = root.with_root(|fiber_root| {
        let arena = fiber_root.arena();
        let mut stack = vec![fiber_root.current()];
        let mut count = 0;
        while let Some(id) = stack.pop() {
            let fiber = arena.get(id).unwrap();
            if fiber.tag.is_host() {
                assert!(known.contains(fiber.state_node.as_ref().unwrap()));
                count += 1;
            }
            stack.extend(arena.children(id));
        }
        count
    });
    assert_eq!(host_fibers, known.len() - 1);
}

#[test]
fn test_fiber_count_stays_bounded() {
    let (root, _container) = setup();
    for _ in 0..5 {
        root.flush_sync(title()).unwrap();
    }
    // Root, h1, text, span: at most two fibers each.
    let fibers = root.with_root(|fiber_root| fiber_root.arena().len());
    assert!(fibers <= 8, "{fibers} fibers alive");
}

// =============================================================================
// Updates
// =============================================================================

#[test]
fn test_attribute_change_updates_in_place() {
    let (root, container) = setup();
    root.flush_sync(Element::host("a").attr("href", "/x").text("go")).unwrap();
    take_ops(&root);

    root.flush_sync(Element::host("a").attr("href", "/y").text("go")).unwrap();
    let ops = take_ops(&root);
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0], HostOp::Update { changes: 1, .. }));
    assert_eq!(markup(&root, container), "<a href=\"/y\">go</a>");
}

#[test]
fn test_text_node_update() {
    let (root, container) = setup();
    root.flush_sync(Element::host("p").child("hello ").child(Element::host("b").text("you"))).unwrap();
    take_ops(&root);

    root.flush_sync(Element::host("p").child("bye ").child(Element::host("b").text("you"))).unwrap();
    let ops = take_ops(&root);
    assert_eq!(ops.len(), 1);
    assert!(matches!(&ops[0], HostOp::TextUpdate { text, .. } if text == "bye "));
    assert_eq!(markup(&root, container), "<p>bye <b>you</b></p>");
}

#[test]
fn test_text_content_to_children() {
    let (root, container) = setup();
    root.flush_sync(Element::host("p").text("x")).unwrap();
    take_ops(&root);

    root.flush_sync(Element::host("p").child(Element::host("span"))).unwrap();
    let ops = take_ops(&root);
    assert!(ops.iter().any(|op| matches!(op, HostOp::ResetText { .. })));
    assert_eq!(markup(&root, container), "<p><span></span></p>");
}

#[test]
fn test_children_to_text_content() {
    let (root, container) = setup();
    root.flush_sync(Element::host("p").child(Element::host("span")).child(Element::host("i"))).unwrap();
    take_ops(&root);

    root.flush_sync(Element::host("p").text("y")).unwrap();
    let ops = take_ops(&root);
    assert_eq!(ops.iter().filter(|op| matches!(op, HostOp::Remove { .. })).count(), 2);
    assert_eq!(markup(&root, container), "<p>y</p>");
}

#[test]
fn test_kind_change_replaces_node() {
    let (root, container) = setup();
    root.flush_sync(Element::host("div").child(Element::host("p").text("a"))).unwrap();
    take_ops(&root);

    root.flush_sync(Element::host("div").child(Element::host("pre").text("a"))).unwrap();
    let ops = structural(&take_ops(&root));
    assert_eq!(ops.len(), 2);
    assert!(matches!(ops[0], HostOp::Remove { .. }));
    assert!(matches!(ops[1], HostOp::Append { .. }));
    assert_eq!(markup(&root, container), "<div><pre>a</pre></div>");
}

// =============================================================================
// Keyed Lists
// =============================================================================

#[test]
fn test_keyed_insert_at_front() {
    let (root, container) = setup();
    root.flush_sync(list(&["a", "b", "c"])).unwrap();
    let before = items(&root, container);
    take_ops(&root);

    root.flush_sync(list(&["x", "a", "b", "c"])).unwrap();
    let ops = structural(&take_ops(&root));
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0], HostOp::InsertBefore { before: anchor, .. } if anchor == before["a"]));

    let after = items(&root, container);
    for key in ["a", "b", "c"] {
        assert_eq!(after[key], before[key]);
    }
    assert_eq!(root.with_host(|host| host.text_content(container)), "xabc");
}

#[test]
fn test_keyed_reorder_moves_one() {
    let (root, container) = setup();
    root.flush_sync(list(&["a", "b", "c"])).unwrap();
    let before = items(&root, container);
    take_ops(&root);

    root.flush_sync(list(&["b", "c", "a"])).unwrap();
    let ops = structural(&take_ops(&root));
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0], HostOp::Append { child, .. } if child == before["a"]));
    assert_eq!(root.with_host(|host| host.text_content(container)), "bca");
}

#[test]
fn test_keyed_removal() {
    let (root, container) = setup();
    root.flush_sync(list(&["a", "b", "c"])).unwrap();
    let before = items(&root, container);
    take_ops(&root);

    root.flush_sync(list(&["a", "c"])).unwrap();
    let ops = structural(&take_ops(&root));
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0], HostOp::Remove { child, .. } if child == before["b"]));
    assert!(root.with_host(|host| !host.contains(before["b"])));
    assert_eq!(root.with_host(|host| host.text_content(container)), "ac");
}

#[test]
fn test_duplicate_prior_keys_are_all_removed() {
    let (root, container) = setup();
    root.flush_sync(
        Element::host("ul")
            .child(Element::host("li").with_key("a").text("x"))
            .child(Element::host("li").with_key("a").text("y")),
    )
    .unwrap();
    assert_eq!(markup(&root, container), "<ul><li>x</li><li>y</li></ul>");

    root.flush_sync(list(&["z"])).unwrap();
    assert_eq!(markup(&root, container), "<ul><li>z</li></ul>");
    // Container, ul and the new li.
    assert_eq!(root.with_host(|host| host.len()), 3);
}

#[test]
fn test_insert_into_fragment_before_sibling() {
    let (root, container) = setup();
    let view = |inner: Node| {
        Element::host("div")
            .child(Element::host("span").text("a"))
            .child(Element::fragment().with_key("f").child(inner))
            .child(Element::host("span").text("c"))
    };
    root.flush_sync(view(Node::Empty)).unwrap();
    assert_eq!(markup(&root, container), "<div><span>a</span><span>c</span></div>");

    root.flush_sync(view(Element::host("i").text("b").into())).unwrap();
    assert_eq!(
        markup(&root, container),
        "<div><span>a</span><i>b</i><span>c</span></div>"
    );
}

proptest! {
    #[test]
    fn test_keyed_lists_match_description(
        before in proptest::sample::subsequence((0..8).collect::<Vec<u8>>(), 0..=8).prop_shuffle(),
        after in proptest::sample::subsequence((0..8).collect::<Vec<u8>>(), 0..=8).prop_shuffle(),
    ) {
        let (root, container) = setup();
        let before: Vec<String> = before.iter().map(|n| n.to_string()).collect();
        let after: Vec<String> = after.iter().map(|n| n.to_string()).collect();
        fn keys(values: &[String]) -> Vec<&str> { values.iter().map(String::as_str).collect() }

        root.flush_sync(list(&keys(&before))).unwrap();
        let old_items = items(&root, container);

        root.flush_sync(list(&keys(&after))).unwrap();
        let text = root.with_host(|host| host.text_content(container));
        prop_assert_eq!(text, after.concat());

        let new_items = items(&root, container);
        for key in &after {
            if let Some(old) = old_items.get(key) {
                prop_assert_eq!(new_items[key], *old);
            }
        }
    }
}

// =============================================================================
// Components
// =============================================================================

#[test]
fn test_function_component() {
    let (root, container) = setup();
    let greeting = ComponentType::function("Greeting", |props| {
        let name = props
            .attribute("name")
            .and_then(|value| value.as_str())
            .unwrap_or("nobody")
            .to_string();
        Element::host("p").text(format!("hi {name}")).into()
    });

    root.flush_sync(Element::component(greeting.clone()).attr("name", "ann")).unwrap();
    assert_eq!(markup(&root, container), "<p>hi ann</p>");
    take_ops(&root);

    root.flush_sync(Element::component(greeting).attr("name", "bob")).unwrap();
    let ops = take_ops(&root);
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0], HostOp::Update { .. }));
    assert_eq!(markup(&root, container), "<p>hi bob</p>");
}

#[test]
fn test_component_removal_removes_host_children() {
    let (root, container) = setup();
    let pair = ComponentType::function("Pair", |_| {
        Node::List(vec![
            Element::host("b").text("1").into(),
            Element::host("i").text("2").into(),
        ])
    });
    root.flush_sync(Element::host("div").child(Element::component(pair))).unwrap();
    assert_eq!(markup(&root, container), "<div><b>1</b><i>2</i></div>");

    root.flush_sync(Element::host("div")).unwrap();
    assert_eq!(markup(&root, container), "<div></div>");
}

#[test]
fn test_context_provider_is_transparent() {
    let (root, container) = setup();
    let tree = Element::provider(ContextId(1), "dark").child(Element::host("p").text("x"));
    root.flush_sync(tree).unwrap();
    assert_eq!(markup(&root, container), "<p>x</p>");
}

#[test]
fn test_class_component_strict_policy() {
    let config = ReconcilerConfig::default().with_unsupported_tags(UnsupportedTagPolicy::Error);
    let (root, container) = setup_with(config);
    let legacy = ComponentType::class("Legacy", |_| Node::Empty);

    let err = root.flush_sync(Element::component(legacy)).unwrap_err();
    match err {
        ReconcileError::UnsupportedTag { tag, name } => {
            assert_eq!(tag, WorkTag::ClassComponent);
            assert_eq!(name, "Legacy");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(markup(&root, container), "");
}

#[test]
fn test_class_component_skip_policy() {
    let config = ReconcilerConfig::default().with_unsupported_tags(UnsupportedTagPolicy::Skip);
    let (root, container) = setup_with(config);
    let legacy = ComponentType::class("Legacy", |_| Element::host("never").into());

    let tree = Element::host("div")
        .child(Element::component(legacy))
        .child(Element::host("p").text("x"));
    root.flush_sync(tree).unwrap();
    assert_eq!(markup(&root, container), "<div><p>x</p></div>");
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_failed_pass_leaves_output_untouched() {
    let (root, container) = setup();
    root.flush_sync(Element::host("div").child(Element::host("p").text("kept"))).unwrap();
    let before = markup(&root, container);
    take_ops(&root);

    let bad = Element::host("div")
        .child(Element::host("section").child("x"))
        .child(Element::host("footer").child(Element::host("")));
    let err = root.flush_sync(bad).unwrap_err();
    assert!(matches!(err, ReconcileError::UnrecognizedKind(_)));
    assert_eq!(markup(&root, container), before);
    assert!(take_ops(&root).iter().all(|op| !matches!(
        op,
        HostOp::Remove { .. } | HostOp::Update { .. } | HostOp::TextUpdate { .. } | HostOp::InsertBefore { .. }
    )));

    // The root keeps working.
    root.flush_sync(Element::host("div").child(Element::host("p").text("again"))).unwrap();
    assert_eq!(markup(&root, container), "<div><p>again</p></div>");
}

#[test]
fn test_scheduled_failure_is_reported() {
    let (root, container) = setup();
    let mut scheduler = Scheduler::new();
    root.render(Element::host(""), &mut scheduler).unwrap();
    assert!(scheduler.run_until_idle().is_err());
    assert_eq!(markup(&root, container), "");

    root.render(Element::host("p").text("ok"), &mut scheduler).unwrap();
    scheduler.run_until_idle().unwrap();
    assert_eq!(markup(&root, container), "<p>ok</p>");
}

// =============================================================================
// Refs
// =============================================================================

#[test]
fn test_ref_attach_and_detach() {
    let (root, container) = setup();
    let node_ref = NodeRef::new();
    root.flush_sync(Element::host("div").child(Element::host("span").with_ref(&node_ref).text("x")))
        .unwrap();

    let span = root.with_host(|host| host.children(host.children(container)[0])[0]);
    assert_eq!(node_ref.get::<HostNodeId>(), Some(span));

    root.flush_sync(Element::host("div")).unwrap();
    assert!(!node_ref.is_attached());
}

#[test]
fn test_ref_moves_between_elements() {
    let (root, container) = setup();
    let first = NodeRef::new();
    let second = NodeRef::new();
    root.flush_sync(Element::host("p").with_ref(&first).text("x")).unwrap();
    root.flush_sync(Element::host("p").with_ref(&second).text("x")).unwrap();

    let p = root.with_host(|host| host.children(container)[0]);
    assert!(!first.is_attached());
    assert_eq!(second.get::<HostNodeId>(), Some(p));
}

#[test]
fn test_ref_moves_off_deleted_node() {
    let (root, container) = setup();
    let node_ref = NodeRef::new();
    root.flush_sync(
        Element::host("div")
            .child(Element::host("p").with_key("1"))
            .child(Element::host("section").with_key("2").child(Element::host("i").with_ref(&node_ref))),
    )
    .unwrap();
    let i = root.with_host(|host| {
        let div = host.children(container)[0];
        host.children(host.children(div)[1])[0]
    });
    assert_eq!(node_ref.get::<HostNodeId>(), Some(i));

    // The new owner comes before the deleted node in the tree.
    root.flush_sync(
        Element::host("div")
            .child(Element::host("p").with_key("1").with_ref(&node_ref))
            .child(Element::host("section").with_key("2")),
    )
    .unwrap();
    let p = root.with_host(|host| host.children(host.children(container)[0])[0]);
    assert_eq!(node_ref.get::<HostNodeId>(), Some(p));
    assert_eq!(markup(&root, container), "<div><p></p><section></section></div>");
}

// =============================================================================
// Scheduling
// =============================================================================

#[test]
fn test_renders_coalesce_into_one_pass() {
    let (root, container) = setup();
    let mut scheduler = Scheduler::new();

    assert!(root.render(Element::host("p").text("1"), &mut scheduler).unwrap().is_some());
    assert!(root.render(Element::host("p").text("2"), &mut scheduler).unwrap().is_none());
    assert!(root.render(Element::host("p").text("3"), &mut scheduler).unwrap().is_none());
    assert_eq!(scheduler.pending_count(), 1);

    scheduler.run_until_idle().unwrap();
    assert_eq!(markup(&root, container), "<p>3</p>");
    assert_eq!(root.with_root(|fiber_root| fiber_root.commit_count()), 1);

    // A new request after the pass schedules again.
    assert!(root.render(Element::host("p").text("4"), &mut scheduler).unwrap().is_some());
}

#[test]
fn test_deadline_splits_roots_across_slices() {
    let (first, first_container) = setup();
    let (second, second_container) = setup();
    let mut scheduler = Scheduler::new();
    first.render(Element::host("p").text("a"), &mut scheduler).unwrap();
    second.render(Element::host("p").text("b"), &mut scheduler).unwrap();

    let expired = || true;
    assert!(scheduler.run_slice(&expired).unwrap());
    assert_eq!(markup(&first, first_container), "<p>a</p>");
    assert_eq!(markup(&second, second_container), "");

    assert!(!scheduler.run_frame().unwrap());
    assert_eq!(markup(&second, second_container), "<p>b</p>");
}

#[test]
fn test_unmount_clears_container() {
    let (root, container) = setup();
    let mut scheduler = Scheduler::new();
    root.render(title(), &mut scheduler).unwrap();
    scheduler.run_until_idle().unwrap();

    root.unmount(&mut scheduler).unwrap();
    scheduler.run_until_idle().unwrap();
    assert_eq!(markup(&root, container), "");
    assert_eq!(root.with_host(|host| host.len()), 1);
}
