use serde::{Deserialize, Serialize};

use beacon_core::{
    CheckServiceNode, CoreError, HealthCheck, Node, ReadTxn, Scope, Service, StorageError, Table,
    WriteTxn,
};

use crate::store::Store;

/// A node with an optional service and any checks, registered together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub node: Node,
    #[serde(default)]
    pub service: Option<Service>,
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
}

impl Registration {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            service: None,
            checks: Vec::new(),
        }
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_check(mut self, check: HealthCheck) -> Self {
        self.checks.push(check);
        self
    }
}

pub fn ensure_registration_txn<W: WriteTxn + ?Sized>(
    tx: &mut W,
    reg: &Registration,
) -> Result<(), StorageError> {
    ensure_node_txn(tx, &reg.node)?;
    if let Some(svc) = &reg.service {
        ensure_service_txn(tx, svc)?;
    }
    for check in &reg.checks {
        ensure_check_txn(tx, check)?;
    }
    Ok(())
}

/// Upsert a node. Writing an identical node is a no-op.
pub fn ensure_node_txn<W: WriteTxn + ?Sized>(tx: &mut W, node: &Node) -> Result<(), StorageError> {
    if node.node.is_empty() {
        return Err(StorageError::Invalid("node name is required".to_string()));
    }
    let mut node = node.clone();
    if node.partition.is_empty() {
        node.partition = beacon_core::DEFAULT_PARTITION.to_string();
    }

    let idx = tx.index();
    let existing = tx.get_node(&node.node, &node.partition)?;
    if matches!(&existing, Some(e) if e.is_same(&node)) {
        return Ok(());
    }

    node.create_index = existing.map_or(idx, |e| e.create_index);
    node.modify_index = idx;
    tx.insert_node(node)?;
    tx.set_table_index(Table::Nodes, idx);
    Ok(())
}

/// Upsert a service instance on an existing node.
pub fn ensure_service_txn<W: WriteTxn + ?Sized>(
    tx: &mut W,
    svc: &Service,
) -> Result<(), StorageError> {
    if svc.id.is_empty() || svc.name.is_empty() {
        return Err(StorageError::Invalid(
            "service id and name are required".to_string(),
        ));
    }
    let mut svc = svc.clone();
    svc.scope.normalize();

    if tx.get_node(&svc.node, &svc.scope.partition)?.is_none() {
        return Err(StorageError::MissingNode(svc.node.clone()));
    }

    let idx = tx.index();
    let existing = tx.get_service(&svc.node, &svc.id, &svc.scope)?;
    if matches!(&existing, Some(e) if e.is_same(&svc)) {
        return Ok(());
    }

    svc.create_index = existing.map_or(idx, |e| e.create_index);
    svc.modify_index = idx;
    tx.insert_service(svc)?;
    tx.set_table_index(Table::Services, idx);
    Ok(())
}

/// Upsert a check. Service checks take the name and tags of their service.
pub fn ensure_check_txn<W: WriteTxn + ?Sized>(
    tx: &mut W,
    check: &HealthCheck,
) -> Result<(), StorageError> {
    if check.check_id.is_empty() {
        return Err(StorageError::Invalid("check id is required".to_string()));
    }
    let mut check = check.clone();
    check.scope.normalize();

    if tx.get_node(&check.node, &check.scope.partition)?.is_none() {
        return Err(StorageError::MissingNode(check.node.clone()));
    }

    if !check.is_node_scoped() {
        let svc = tx
            .get_service(&check.node, &check.service_id, &check.scope)?
            .ok_or_else(|| StorageError::MissingService {
                node: check.node.clone(),
                service_id: check.service_id.clone(),
            })?;
        check.service_name = svc.name;
        check.service_tags = svc.tags;
    }

    let idx = tx.index();
    let existing = tx.get_check(&check.node, &check.check_id, &check.scope)?;
    if matches!(&existing, Some(e) if e.is_same(&check)) {
        return Ok(());
    }

    check.create_index = existing.map_or(idx, |e| e.create_index);
    check.modify_index = idx;
    tx.insert_check(check)?;
    tx.set_table_index(Table::Checks, idx);
    Ok(())
}

/// Remove a node with every service and check on it.
/// Returns false when the node does not exist.
pub fn delete_node_txn<W: WriteTxn + ?Sized>(
    tx: &mut W,
    node: &str,
    partition: &str,
) -> Result<bool, StorageError> {
    if tx.get_node(node, partition)?.is_none() {
        return Ok(false);
    }
    let idx = tx.index();

    let services = tx.node_services(node, partition)?;
    for svc in &services {
        tx.delete_service(&svc.node, &svc.id, &svc.scope)?;
    }
    if !services.is_empty() {
        tx.set_table_index(Table::Services, idx);
    }

    let checks = tx.node_checks(node, partition)?;
    for check in &checks {
        tx.delete_check(&check.node, &check.check_id, &check.scope)?;
    }
    if !checks.is_empty() {
        tx.set_table_index(Table::Checks, idx);
    }

    tx.delete_node(node, partition)?;
    tx.set_table_index(Table::Nodes, idx);
    Ok(true)
}

/// Remove a service instance and its checks.
pub fn delete_service_txn<W: WriteTxn + ?Sized>(
    tx: &mut W,
    node: &str,
    service_id: &str,
    scope: &Scope,
) -> Result<bool, StorageError> {
    let Some(svc) = tx.get_service(node, service_id, scope)? else {
        return Ok(false);
    };
    let idx = tx.index();

    let checks: Vec<HealthCheck> = tx
        .node_checks(node, &svc.scope.partition)?
        .into_iter()
        .filter(|c| c.service_id == svc.id && c.scope == svc.scope)
        .collect();
    for check in &checks {
        tx.delete_check(&check.node, &check.check_id, &check.scope)?;
    }
    if !checks.is_empty() {
        tx.set_table_index(Table::Checks, idx);
    }

    tx.delete_service(node, service_id, scope)?;
    tx.set_table_index(Table::Services, idx);
    Ok(true)
}

pub fn delete_check_txn<W: WriteTxn + ?Sized>(
    tx: &mut W,
    node: &str,
    check_id: &str,
    scope: &Scope,
) -> Result<bool, StorageError> {
    if tx.delete_check(node, check_id, scope)?.is_none() {
        return Ok(false);
    }
    let idx = tx.index();
    tx.set_table_index(Table::Checks, idx);
    Ok(true)
}

/// Join a service with its node and the checks that apply to it: node
/// checks first, then the instance's own.
pub fn join_checks(node: Node, svc: Service, checks: &[HealthCheck]) -> CheckServiceNode {
    let mut joined: Vec<HealthCheck> = checks
        .iter()
        .filter(|c| c.is_node_scoped())
        .cloned()
        .collect();
    joined.extend(
        checks
            .iter()
            .filter(|c| c.service_id == svc.id && c.scope == svc.scope)
            .cloned(),
    );
    CheckServiceNode {
        node,
        service: Some(svc),
        checks: joined,
    }
}

pub fn check_service_node_txn<R: ReadTxn + ?Sized>(
    tx: &R,
    svc: &Service,
) -> Result<CheckServiceNode, StorageError> {
    let node = tx
        .get_node(&svc.node, &svc.scope.partition)?
        .ok_or_else(|| StorageError::MissingNode(svc.node.clone()))?;
    let checks = tx.node_checks(&svc.node, &svc.scope.partition)?;
    Ok(join_checks(node, svc.clone(), &checks))
}

impl Store {
    /// Register a node, service and checks in one transaction.
    pub fn ensure_registration(&self, reg: &Registration) -> Result<u64, CoreError> {
        let mut tx = self.begin_write();
        let idx = tx.index();
        ensure_registration_txn(&mut tx, reg)?;
        tx.commit()?;
        Ok(idx)
    }

    pub fn delete_node(&self, node: &str, partition: &str) -> Result<u64, CoreError> {
        let mut tx = self.begin_write();
        let idx = tx.index();
        delete_node_txn(&mut tx, node, partition)?;
        tx.commit()?;
        Ok(idx)
    }

    pub fn delete_service(
        &self,
        node: &str,
        service_id: &str,
        scope: &Scope,
    ) -> Result<u64, CoreError> {
        let mut tx = self.begin_write();
        let idx = tx.index();
        delete_service_txn(&mut tx, node, service_id, scope)?;
        tx.commit()?;
        Ok(idx)
    }

    pub fn delete_check(
        &self,
        node: &str,
        check_id: &str,
        scope: &Scope,
    ) -> Result<u64, CoreError> {
        let mut tx = self.begin_write();
        let idx = tx.index();
        delete_check_txn(&mut tx, node, check_id, scope)?;
        tx.commit()?;
        Ok(idx)
    }

    pub fn node_services(
        &self,
        node: &str,
        partition: &str,
    ) -> Result<(u64, Vec<Service>), StorageError> {
        let tx = self.read_txn();
        let idx = tx.max_index(&[Table::Nodes, Table::Services]);
        Ok((idx, tx.node_services(node, partition)?))
    }

    /// Instances of `name` joined with their nodes and checks. With
    /// `connect` set, returns the instances that serve connect traffic.
    pub fn check_service_nodes(
        &self,
        name: &str,
        connect: bool,
        scope: &Scope,
    ) -> Result<(u64, Vec<CheckServiceNode>), StorageError> {
        let tx = self.read_txn();
        let idx = tx.max_index(&[Table::Nodes, Table::Services, Table::Checks]);
        let services = if connect {
            tx.connect_services(name, scope)?
        } else {
            tx.services_by_name(name, scope)?
        };

        let mut results = Vec::with_capacity(services.len());
        for svc in &services {
            results.push(check_service_node_txn(&tx, svc)?);
        }
        Ok((idx, results))
    }
}
