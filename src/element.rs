//! Description nodes - the immutable input to reconciliation.
//!
//! A description says *what* the output tree should look like. It never
//! changes after construction; the reconciler compares descriptions against
//! the fibers of the previous render to decide what to reuse.
//!
//! ```text
//! Node::Element(h1 { title: "hello world" })
//!   └─ Node::List
//!        ├─ Node::Text("hello ")
//!        └─ Node::Element(span { style: { color: "cyan" } }) ─ Node::Text("world")
//! ```
//!
//! The builder methods on [`Element`] only shape data. They stand in for the
//! markup syntax other ecosystems use to write descriptions.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::types::Key;

/// Attribute name holding the nested style map.
pub const STYLE: &str = "style";

/// Attribute name for raw markup that collapses children to text.
pub const DANGEROUSLY_SET_INNER_HTML: &str = "dangerouslySetInnerHTML";

// =============================================================================
// Element Kind
// =============================================================================

/// What a description node produces.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    /// Primitive output node named by its tag (`"div"`, `"span"`).
    Host(String),
    /// User component.
    Component(ComponentType),
    /// Transparent grouping of children.
    Fragment,
    /// Context provider; passes its children through.
    Provider(ContextId),
    /// Marker for the root of a tree. Never valid inside a description.
    Root,
    /// Marker for raw text. Text children are written as [`Node::Text`].
    Text,
}

/// Identity of a context provided by [`ElementKind::Provider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u32);

/// Render function of a user component.
pub type RenderFn = dyn Fn(&Props) -> Node;

/// A user component: a named render function.
///
/// Components carrying the class marker map to
/// [`WorkTag::ClassComponent`](crate::types::WorkTag::ClassComponent);
/// plain functions map to
/// [`WorkTag::IndeterminateComponent`](crate::types::WorkTag::IndeterminateComponent).
/// Two component types are equal when they share the same render function.
#[derive(Clone)]
pub struct ComponentType {
    name: Rc<str>,
    is_class: bool,
    render: Rc<RenderFn>,
}

impl ComponentType {
    /// A plain function component.
    pub fn function(name: &str, render: impl Fn(&Props) -> Node + 'static) -> Self {
        Self {
            name: Rc::from(name),
            is_class: false,
            render: Rc::new(render),
        }
    }

    /// A component carrying the class marker.
    pub fn class(name: &str, render: impl Fn(&Props) -> Node + 'static) -> Self {
        Self {
            name: Rc::from(name),
            is_class: true,
            render: Rc::new(render),
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the component carries the class marker.
    pub fn is_class(&self) -> bool {
        self.is_class
    }

    /// Invoke the render function.
    pub fn render(&self, props: &Props) -> Node {
        (self.render)(props)
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.render, &other.render) && self.is_class == other.is_class
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("is_class", &self.is_class)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Props
// =============================================================================

/// Attributes and children of a description.
///
/// `attributes` is order-irrelevant. A `"style"` entry holding an object is
/// applied as a nested style map by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props {
    pub attributes: Map<String, Value>,
    pub children: Node,
}

impl Props {
    /// Look up a scalar attribute.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// The nested style map, if present.
    pub fn style(&self) -> Option<&Map<String, Value>> {
        self.attributes.get(STYLE).and_then(Value::as_object)
    }

    /// Children as a direct text value, when they are a lone string or number.
    pub fn text_children(&self) -> Option<String> {
        match &self.children {
            Node::Text(text) => Some(text.clone()),
            Node::Number(n) => Some(format_number(*n)),
            _ => None,
        }
    }
}

// =============================================================================
// Node
// =============================================================================

/// Any value allowed in a children position.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Node {
    /// Renders nothing (`null`, `false`).
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Element(Rc<Element>),
    List(Vec<Node>),
}

impl Node {
    /// Whether this node renders nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Key of an element node.
    pub fn key(&self) -> Option<&Key> {
        match self {
            Self::Element(element) => element.key(),
            _ => None,
        }
    }
}

/// Render a number the way it appears as text content.
pub fn format_number(n: f64) -> String {
    n.to_string()
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(Rc::new(element))
    }
}

impl From<Rc<Element>> for Node {
    fn from(element: Rc<Element>) -> Self {
        Self::Element(element)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<f64> for Node {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Node {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Node {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<Vec<Node>> for Node {
    fn from(nodes: Vec<Node>) -> Self {
        Self::List(nodes)
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

// =============================================================================
// Node Ref
// =============================================================================

/// Out-parameter receiving the host instance of a host component.
///
/// Attached during commit, cleared when the component is deleted or the ref
/// moves to another element.
#[derive(Clone, Default)]
pub struct NodeRef(Rc<RefCell<Option<Box<dyn Any>>>>);

impl NodeRef {
    /// Create an empty ref.
    pub fn new() -> Self {
        Self::default()
    }

    /// The attached instance, if any and of type `T`.
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.0
            .borrow()
            .as_ref()
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Whether an instance is currently attached.
    pub fn is_attached(&self) -> bool {
        self.0.borrow().is_some()
    }

    pub(crate) fn attach<T: 'static>(&self, instance: T) {
        *self.0.borrow_mut() = Some(Box::new(instance));
    }

    /// Clear the ref if it still holds `instance`. A ref that already moved
    /// on to another instance is left alone.
    pub(crate) fn detach_if<T: PartialEq + 'static>(&self, instance: &T) -> bool {
        let mut slot = self.0.borrow_mut();
        let holds = slot
            .as_ref()
            .and_then(|value| value.downcast_ref::<T>())
            .is_some_and(|current| current == instance);
        if holds {
            slot.take();
        }
        holds
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.is_attached()).finish()
    }
}

// =============================================================================
// Element
// =============================================================================

/// Immutable description of one node of the desired tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    kind: ElementKind,
    key: Option<Key>,
    node_ref: Option<NodeRef>,
    props: Rc<Props>,
}

impl Element {
    /// Describe a node of the given kind with no attributes.
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            key: None,
            node_ref: None,
            props: Rc::new(Props::default()),
        }
    }

    /// Describe a primitive host node.
    pub fn host(tag: impl Into<String>) -> Self {
        Self::new(ElementKind::Host(tag.into()))
    }

    /// Describe a user component.
    pub fn component(component: ComponentType) -> Self {
        Self::new(ElementKind::Component(component))
    }

    /// Describe a fragment.
    pub fn fragment() -> Self {
        Self::new(ElementKind::Fragment)
    }

    /// Describe a context provider.
    pub fn provider(context: ContextId, value: impl Into<Value>) -> Self {
        Self::new(ElementKind::Provider(context)).attr("value", value)
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn node_ref(&self) -> Option<&NodeRef> {
        self.node_ref.as_ref()
    }

    pub fn props(&self) -> &Rc<Props> {
        &self.props
    }

    /// Set the stable identity among siblings.
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Request the host instance through `node_ref`.
    pub fn with_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    /// Set a scalar attribute.
    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        Rc::make_mut(&mut self.props)
            .attributes
            .insert(name.to_string(), value.into());
        self
    }

    /// Set one entry of the nested style map.
    pub fn style(mut self, name: &str, value: impl Into<Value>) -> Self {
        let attributes = &mut Rc::make_mut(&mut self.props).attributes;
        let style = attributes
            .entry(STYLE)
            .or_insert_with(|| Value::Object(Map::new()));
        if !style.is_object() {
            *style = Value::Object(Map::new());
        }
        if let Value::Object(map) = style {
            map.insert(name.to_string(), value.into());
        }
        self
    }

    /// Append a child. A single child stays a single value; a second one
    /// turns the children into a list.
    pub fn child(mut self, child: impl Into<Node>) -> Self {
        let props = Rc::make_mut(&mut self.props);
        let child = child.into();
        props.children = match std::mem::take(&mut props.children) {
            Node::Empty => child,
            Node::List(mut nodes) => {
                nodes.push(child);
                Node::List(nodes)
            }
            single => Node::List(vec![single, child]),
        };
        self
    }

    /// Replace the children with a list.
    pub fn children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        Rc::make_mut(&mut self.props).children =
            Node::List(children.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the children with raw text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        Rc::make_mut(&mut self.props).children = Node::Text(text.into());
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_child_builder_shapes() {
        let single = Element::host("p").child("a");
        assert_eq!(single.props().children, Node::Text("a".into()));

        let many = Element::host("p").child("a").child(Element::host("b"));
        match &many.props().children {
            Node::List(nodes) => assert_eq!(nodes.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_style_is_nested() {
        let span = Element::host("span")
            .style("color", "cyan")
            .attr("className", "barClass");
        assert_eq!(span.props().style(), json!({"color": "cyan"}).as_object());
        assert_eq!(span.props().attribute("className"), Some(&json!("barClass")));
    }

    #[test]
    fn test_text_children() {
        assert_eq!(Element::host("i").text("x").props().text_children(), Some("x".into()));
        assert_eq!(Element::host("i").child(7).props().text_children(), Some("7".into()));
        assert_eq!(Element::host("i").child(1.5).props().text_children(), Some("1.5".into()));
        assert_eq!(Element::host("i").props().text_children(), None);
    }

    #[test]
    fn test_component_identity() {
        let a = ComponentType::function("A", |_| Node::Empty);
        let b = ComponentType::function("A", |_| Node::Empty);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_node_ref_attach() {
        let node_ref = NodeRef::new();
        assert!(!node_ref.is_attached());
        node_ref.attach(42u32);
        assert_eq!(node_ref.get::<u32>(), Some(42));
        assert_eq!(node_ref.get::<String>(), None);
        assert!(!node_ref.detach_if(&7u32));
        assert!(node_ref.is_attached());
        assert!(node_ref.detach_if(&42u32));
        assert!(!node_ref.is_attached());
    }
}
