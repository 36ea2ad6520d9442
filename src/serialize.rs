use ordered_float::NotNan;

use crate::{term::Term, util::HashSet, *};

pub struct SerializeConfig {
    // Maximum number of classes to include, any after this are discarded
    pub max_classes: Option<usize>,
    // Terms whose classes are marked as roots in the output
    pub roots: Vec<TermId>,
}

/// Default is used for exporting JSON and will output all classes.
impl Default for SerializeConfig {
    fn default() -> Self {
        SerializeConfig {
            max_classes: None,
            roots: vec![],
        }
    }
}

impl Engine {
    /// Serialize the congruence classes into a format that can be read by
    /// the egraph-serialize crate.
    ///
    /// Every registered term is a node with cost 1.0. Its e-class is the
    /// root of its congruence class, and its children are the nodes of its
    /// arguments, which are always registered along with it. Quantifiers,
    /// case terms and literals are leaves labelled with their printed form.
    pub fn serialize(&self, config: SerializeConfig) -> egraph_serialize::EGraph {
        let cc = &self.scope.cc;
        let mut result = egraph_serialize::EGraph::default();
        let classes = cc.classes();
        let kept = config.max_classes.unwrap_or(usize::MAX);
        let included: HashSet<TermId> = classes.iter().take(kept).flatten().copied().collect();
        for class in classes.iter().take(kept) {
            let class_id = self.to_class_id(cc.find(class[0]));
            for member in class {
                let (op, children) = match self.terms.get(*member) {
                    Term::App(f, args) => (
                        f.to_string(),
                        args.iter()
                            .map(|a| {
                                if included.contains(a) {
                                    self.to_node_id(*a)
                                } else {
                                    self.omitted_node(&mut result, cc.find(*a))
                                }
                            })
                            .collect(),
                    ),
                    _ => (self.terms.display(*member).to_string(), vec![]),
                };
                result.nodes.insert(
                    self.to_node_id(*member),
                    egraph_serialize::Node {
                        op,
                        eclass: class_id.clone(),
                        cost: NotNan::new(1.0).unwrap(),
                        children,
                        subsumed: false,
                    },
                );
            }
            result.class_data.insert(
                class_id,
                egraph_serialize::ClassData {
                    typ: self
                        .env
                        .type_of(&self.terms, class[0])
                        .map(|ty| ty.to_string()),
                },
            );
        }
        if classes.len() > kept {
            log::warn!(
                "serialized {kept} of {} congruence classes",
                classes.len()
            );
        }
        result.root_eclasses = config
            .roots
            .iter()
            .filter(|t| cc.is_registered(**t))
            .map(|t| self.to_class_id(cc.find(*t)))
            .collect();
        result
    }

    /// A stand-in node for a class dropped by `max_classes`, so that the
    /// children of kept nodes always resolve.
    fn omitted_node(
        &self,
        result: &mut egraph_serialize::EGraph,
        root: TermId,
    ) -> egraph_serialize::NodeId {
        let node_id: egraph_serialize::NodeId = format!("omitted-{}", root.index()).into();
        if !result.nodes.contains_key(&node_id) {
            let class_id = self.to_class_id(root);
            result.nodes.insert(
                node_id.clone(),
                egraph_serialize::Node {
                    op: "[...]".to_string(),
                    eclass: class_id.clone(),
                    cost: NotNan::new(f64::INFINITY).unwrap(),
                    children: vec![],
                    subsumed: false,
                },
            );
            result
                .class_data
                .insert(class_id, egraph_serialize::ClassData { typ: None });
        }
        node_id
    }

    fn to_class_id(&self, root: TermId) -> egraph_serialize::ClassId {
        format!("class-{}", root.index()).into()
    }

    fn to_node_id(&self, t: TermId) -> egraph_serialize::NodeId {
        format!("term-{}", t.index()).into()
    }
}
