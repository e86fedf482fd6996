//! Scope emission: turns one CTE group (or the main scope) into SQL text.

use std::collections::HashSet;

use crate::compute_graph::{NodeId, NodeKind, SortKey};

use super::errors::SqlError;
use super::time_window::{largest_time_range, prewhere_clause};
use super::{EmittedCte, ScopeSpec, SqlGenerator};

#[derive(Default)]
struct ScopeMembers {
    sources: Vec<NodeId>,
    join: Option<NodeId>,
    projections: Vec<NodeId>,
    expressions: Vec<NodeId>,
    filters: Vec<NodeId>,
    sorts: Vec<NodeId>,
    limits: Vec<NodeId>,
}

impl SqlGenerator<'_> {
    /// Emit one scope. Returns the SQL text and the column names the scope
    /// exposes to consumers.
    pub(super) fn emit_scope(
        &mut self,
        spec: &ScopeSpec,
        ctes: &[EmittedCte],
    ) -> Result<(String, Vec<String>), SqlError> {
        let members = self.classify(spec);

        let mut select_items: Vec<String> = Vec::new();
        let mut exposed: Vec<String> = Vec::new();
        let mut seen_names: HashSet<String> = HashSet::new();
        let mut where_clauses: Vec<String> = Vec::new();
        let mut qualify_clauses: Vec<String> = Vec::new();
        let mut window_aliases: HashSet<String> = HashSet::new();

        // Re-export dependency CTE columns in the main scope.
        if spec.is_main {
            for dep in &spec.deps {
                let cte = &ctes[*dep];
                for column in &cte.exposed {
                    if seen_names.insert(column.clone()) {
                        select_items.push(format!("{}.{} AS {}", cte.name, column, column));
                        exposed.push(column.clone());
                    } else {
                        select_items.push(format!("{}.{}", cte.name, column));
                    }
                }
            }
        }

        for id in &members.projections {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            let NodeKind::Projection(projection) = node.kind.clone() else {
                continue;
            };
            let mut first_output: Option<String> = None;
            for column in &projection.columns {
                let (item, output) = match (&column.name, &column.expression) {
                    (Some(name), _) => {
                        let item = match &column.alias {
                            Some(alias) if alias != name => format!("{} AS {}", name, alias),
                            _ => name.clone(),
                        };
                        (item, column.output_name().map(str::to_string))
                    }
                    (None, Some(expr)) => {
                        let fragment = self.translate_operand(expr, &[])?;
                        where_clauses.extend(fragment.where_clauses);
                        let item = match &column.alias {
                            Some(alias) => format!("{} AS {}", fragment.column, alias),
                            None => fragment.column.clone(),
                        };
                        (item, column.alias.clone())
                    }
                    (None, None) => continue,
                };
                let Some(output) = output else { continue };
                first_output.get_or_insert_with(|| output.clone());
                if seen_names.insert(output.clone()) {
                    select_items.push(item);
                    exposed.push(output);
                }
            }
            if let Some(output) = first_output {
                self.node_outputs.insert(id.clone(), output);
            }
        }

        for id in &members.expressions {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            let alias = match &node.kind {
                NodeKind::Expression(e) => e.alias.clone(),
                _ => None,
            };
            let fragment = self.translate_expression_node(id)?;
            where_clauses.extend(fragment.where_clauses.clone());
            match alias {
                Some(alias) => {
                    if fragment.is_window {
                        window_aliases.insert(alias.clone());
                    }
                    self.node_outputs.insert(id.clone(), alias.clone());
                    if seen_names.insert(alias.clone()) {
                        select_items.push(format!("{} AS {}", fragment.column, alias));
                        exposed.push(alias);
                    }
                }
                None => {
                    select_items.push(fragment.column.clone());
                    self.node_outputs.insert(id.clone(), fragment.column);
                }
            }
        }

        for id in &members.filters {
            let fragment = self.translate_filter_tree(id, &window_aliases)?;
            if fragment.sql.is_empty() {
                continue;
            }
            if fragment.touches_window {
                qualify_clauses.push(fragment.sql);
            } else {
                where_clauses.push(fragment.sql);
            }
        }

        let from_lines = self.build_from(&members, spec, ctes);
        let prewhere = self.build_prewhere(&members);

        dedup_in_order(&mut where_clauses);
        dedup_in_order(&mut qualify_clauses);

        let mut group_by_dims: Vec<String> = Vec::new();
        let mut limit_lines: Vec<String> = Vec::new();
        for id in &members.limits {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            let NodeKind::Limit(limit) = &node.kind else {
                continue;
            };
            let mut line = format!("LIMIT {}", limit.limit);
            if let Some(offset) = node.metadata.offset {
                line.push_str(&format!(" OFFSET {}", offset));
            }
            if node.metadata.is_grouped {
                if let Some(dimension) = &node.metadata.group_dimension {
                    line.push_str(&format!(" BY {}", dimension));
                    if !group_by_dims.contains(dimension) {
                        group_by_dims.push(dimension.clone());
                    }
                }
            }
            limit_lines.push(line);
        }

        let mut order_by_items: Vec<String> = Vec::new();
        for id in &members.sorts {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            let NodeKind::Sort(sort) = &node.kind else {
                continue;
            };
            for criterion in &sort.criteria {
                let key = match &criterion.key {
                    SortKey::Node(node_id) => self
                        .node_output(node_id)
                        .unwrap_or_else(|| node_id.clone()),
                    SortKey::Raw(text) => text.clone(),
                };
                order_by_items.push(format!("{} {}", key, criterion.direction.as_str()));
            }
        }

        if select_items.is_empty() {
            select_items.push("*".to_string());
        }

        let mut lines: Vec<String> = Vec::new();
        lines.push(format!("SELECT {}", select_items.join(", ")));
        lines.extend(from_lines);
        if let Some(prewhere) = prewhere {
            lines.push(format!("PREWHERE {}", prewhere));
        }
        if !where_clauses.is_empty() {
            lines.push(format!("WHERE {}", where_clauses.join(" AND ")));
        }
        if !qualify_clauses.is_empty() {
            lines.push(format!("QUALIFY {}", qualify_clauses.join(" AND ")));
        }
        if !group_by_dims.is_empty() {
            lines.push(format!("GROUP BY {}", group_by_dims.join(", ")));
        }
        if !order_by_items.is_empty() {
            lines.push(format!("ORDER BY {}", order_by_items.join(", ")));
        }
        lines.extend(limit_lines);

        Ok((lines.join("\n"), exposed))
    }

    fn classify(&self, spec: &ScopeSpec) -> ScopeMembers {
        let member_set: HashSet<&str> = spec.nodes.iter().map(String::as_str).collect();
        let mut members = ScopeMembers::default();
        for id in &spec.nodes {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            match &node.kind {
                NodeKind::Source(_) => members.sources.push(id.clone()),
                NodeKind::Join(_) => members.join = Some(id.clone()),
                NodeKind::Projection(_) => members.projections.push(id.clone()),
                NodeKind::Expression(_) if !node.metadata.is_parameter => {
                    members.expressions.push(id.clone())
                }
                NodeKind::Expression(_) => {}
                NodeKind::Filter(_) | NodeKind::CompositeFilter(_) => {
                    // Only the top of each filter tree is emitted; children
                    // render through their composite.
                    let is_top = self.graph.find_dependents(id).iter().all(|dep| {
                        !member_set.contains(dep.as_str())
                            || !self
                                .graph
                                .node(dep)
                                .map(|d| d.kind.is_filterish())
                                .unwrap_or(false)
                    });
                    if is_top {
                        members.filters.push(id.clone());
                    }
                }
                NodeKind::Sort(_) => members.sorts.push(id.clone()),
                NodeKind::Limit(_) => members.limits.push(id.clone()),
            }
        }
        members
    }

    fn build_from(
        &self,
        members: &ScopeMembers,
        spec: &ScopeSpec,
        ctes: &[EmittedCte],
    ) -> Vec<String> {
        let mut lines: Vec<String> = Vec::new();

        let join_conditions = members.join.as_ref().and_then(|id| {
            self.graph.node(id).and_then(|n| match &n.kind {
                NodeKind::Join(join) => Some(join.clone()),
                _ => None,
            })
        });

        let mut base_alias: Option<String> = None;
        if !members.sources.is_empty() {
            let table_of = |id: &str| -> Option<String> {
                match &self.graph.node(id)?.kind {
                    NodeKind::Source(s) => Some(s.table.clone()),
                    _ => None,
                }
            };
            let base = table_of(&members.sources[0]).unwrap_or_default();
            lines.push(format!("FROM {}", base));
            base_alias = Some(base);

            let mut earlier: Vec<NodeId> = vec![members.sources[0].clone()];
            for source in members.sources.iter().skip(1) {
                let table = table_of(source).unwrap_or_default();
                let conditions: Vec<String> = join_conditions
                    .as_ref()
                    .map(|join| {
                        join.conditions
                            .iter()
                            .filter(|c| {
                                (c.left.node == *source && earlier.contains(&c.right.node))
                                    || (c.right.node == *source && earlier.contains(&c.left.node))
                            })
                            .map(|c| {
                                format!(
                                    "{}.{} {} {}.{}",
                                    c.left.table,
                                    c.left.column,
                                    c.op.sql(),
                                    c.right.table,
                                    c.right.column
                                )
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                if conditions.is_empty() {
                    lines.push(format!("CROSS JOIN {}", table));
                } else {
                    let join_kind = join_conditions
                        .as_ref()
                        .map(|j| j.join_type.sql())
                        .unwrap_or("INNER JOIN");
                    lines.push(format!(
                        "{} {} ON {}",
                        join_kind,
                        table,
                        conditions.join(" AND ")
                    ));
                }
                earlier.push(source.clone());
            }
        }

        for (position, dep) in spec.deps.iter().enumerate() {
            let cte = &ctes[*dep];
            match &base_alias {
                None if position == 0 => {
                    lines.push(format!("FROM {}", cte.name));
                    base_alias = Some(cte.name.clone());
                }
                Some(base) if !spec.is_main => {
                    // Dependent CTEs join on a shared primary key when both
                    // sides expose one.
                    match self.shared_key(base, &cte.exposed) {
                        Some(key) => lines.push(format!(
                            "INNER JOIN {} ON {}.{} = {}.{}",
                            cte.name, base, key, cte.name, key
                        )),
                        None => lines.push(format!("CROSS JOIN {}", cte.name)),
                    }
                }
                Some(_) => lines.push(format!("CROSS JOIN {}", cte.name)),
                None => lines.push(format!("CROSS JOIN {}", cte.name)),
            }
        }

        lines
    }

    /// A primary-key column exposed by both sides of a CTE join. Tables are
    /// visited in name order so the choice is stable.
    fn shared_key(&self, _base: &str, exposed: &[String]) -> Option<String> {
        let mut names: Vec<&String> = self.config.tables.keys().collect();
        names.sort();
        for name in names {
            let table = &self.config.tables[name];
            for pk in &table.primary_keys {
                if exposed.iter().any(|c| c == pk) {
                    return Some(pk.clone());
                }
            }
        }
        None
    }

    fn build_prewhere(&self, members: &ScopeMembers) -> Option<String> {
        let range = largest_time_range(self.graph)?;
        for source in &members.sources {
            let Some(node) = self.graph.node(source) else {
                continue;
            };
            let NodeKind::Source(s) = &node.kind else {
                continue;
            };
            if let Some(time_column) = &s.time_column {
                return Some(prewhere_clause(&range, time_column, &self.config.time_format));
            }
        }
        None
    }
}

fn dedup_in_order(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}
