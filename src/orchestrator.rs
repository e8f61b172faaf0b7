//! The multi-phase bulk-merge orchestrator.
//!
//! Drives the insert/merge/read/truncate lifecycle over one connection scope:
//! staging-table setup, bulk transfer, server-side merge, output capture, and
//! a guaranteed teardown phase that runs regardless of which step failed.
//!
//! The protocol is written once as async; the blocking entry points wrap it
//! in a current-thread runtime and produce identical side effects and row
//! ordering. Suspension points are exactly the database round trips;
//! materialization runs synchronously in both code paths.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bail;
use crate::bulk_error;
use crate::config::BulkConfig;
use crate::connection::ConnectionScope;
use crate::entity::{Entity, EntityType};
use crate::error::{BulkError, BulkResult, ErrorKind};
use crate::materialize::{extract_path, RowMaterializer, ShadowValueResolver};
use crate::progress::{ProgressReporter, ProgressSink};
use crate::schema::{
    ColumnSchemaBuilder, DiscriminatorStrategy, EntitySchemaProvider, FirstTextualShadowColumn,
    SchemaProviderCache, TableName, TableSchema,
};
use crate::signal::CancellationSignal;
use crate::statements::StatementBuilder;
use crate::types::{OperationKind, RowBuffer, Value};
use crate::writer::{BulkWriter, BulkWriterConfig};

/// Immutable per-call record describing one bulk operation.
///
/// Owned by the orchestrator for the duration of a single call; never shared
/// across concurrent calls.
pub struct OperationContext<'a> {
    /// Target table.
    pub table: TableName,
    /// Domain type of the entities.
    pub entity_type: EntityType,
    /// Read-only configuration snapshot for this call.
    pub config: &'a BulkConfig,
    /// Optional sink receiving progress fractions.
    pub progress: Option<ProgressSink>,
    /// Optional cancellation signal, honored between round trips.
    pub cancel: Option<CancellationSignal>,
    /// Optional resolver for dynamically valued shadow properties.
    pub shadow_resolver: Option<&'a ShadowValueResolver>,
}

impl<'a> OperationContext<'a> {
    /// Creates a context with no progress sink, cancellation, or resolver.
    pub fn new(table: TableName, entity_type: EntityType, config: &'a BulkConfig) -> Self {
        Self {
            table,
            entity_type,
            config,
            progress: None,
            cancel: None,
            shadow_resolver: None,
        }
    }

    /// Attaches a progress sink.
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Attaches a cancellation signal.
    pub fn with_cancellation(mut self, signal: CancellationSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// Attaches a dynamic shadow value resolver.
    pub fn with_shadow_resolver(mut self, resolver: &'a ShadowValueResolver) -> Self {
        self.shadow_resolver = Some(resolver);
        self
    }

    fn check_canceled(&self) -> BulkResult<()> {
        if let Some(cancel) = &self.cancel
            && cancel.is_canceled()
        {
            bail!(
                ErrorKind::OperationCanceled,
                "Bulk operation canceled between round trips",
                detail = format!("table {}", self.table)
            );
        }

        Ok(())
    }
}

/// Tables and connection state created during one staged operation.
///
/// Tracks exactly what the cleanup phase has to undo.
struct StagedResources {
    staging: TableName,
    staging_created: bool,
    output: TableName,
    output_created: bool,
    identity_enabled: bool,
}

impl StagedResources {
    fn for_table(table: &TableName) -> Self {
        // Salted names keep concurrent operations on different connections
        // from colliding on staging tables.
        let salt = Uuid::new_v4().simple().to_string();
        let salt = &salt[..8];

        Self {
            staging: table.with_suffix(&format!("_staging_{salt}")),
            staging_created: false,
            output: table.with_suffix(&format!("_output_{salt}")),
            output_created: false,
            identity_enabled: false,
        }
    }
}

/// Sequences bulk operations against a destination table.
///
/// Generic over the collaborators: the entity schema provider (wrapped in a
/// process-lifetime snapshot cache), the statement builder, and the bulk
/// writer. The connection scope is supplied per call.
pub struct BulkMergeOrchestrator<P, S, W> {
    provider: SchemaProviderCache<P>,
    statements: S,
    writer: W,
    discriminator: Box<dyn DiscriminatorStrategy>,
}

impl<P, S, W> BulkMergeOrchestrator<P, S, W>
where
    P: EntitySchemaProvider,
    S: StatementBuilder,
    W: BulkWriter,
{
    /// Creates an orchestrator using the compatibility discriminator heuristic.
    pub fn new(provider: P, statements: S, writer: W) -> Self {
        Self {
            provider: SchemaProviderCache::new(provider),
            statements,
            writer,
            discriminator: Box::new(FirstTextualShadowColumn),
        }
    }

    /// Replaces the discriminator detection strategy.
    pub fn with_discriminator(mut self, strategy: impl DiscriminatorStrategy + 'static) -> Self {
        self.discriminator = Box::new(strategy);
        self
    }

    /// Bulk-inserts entities straight into the target table.
    pub async fn insert<C: ConnectionScope>(
        &self,
        conn: &C,
        ctx: &OperationContext<'_>,
        entities: &[Box<dyn Entity>],
    ) -> BulkResult<()> {
        validate_config(ctx.config)?;
        ctx.check_canceled()?;

        let schema = self.build_schema(ctx, OperationKind::Insert)?;
        let buffer = self.materialize(ctx, &schema, entities)?;

        info!(
            table = %ctx.table,
            rows = buffer.len(),
            "starting bulk insert"
        );

        let result = self.transfer(ctx, &ctx.table, &buffer).await;

        match result {
            Ok(rows) => {
                info!(table = %ctx.table, rows, "bulk insert finished");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::TransferColumnMismatch => {
                self.probe_destination(conn, ctx, &schema).await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Blocking form of [`BulkMergeOrchestrator::insert`].
    pub fn insert_blocking<C: ConnectionScope>(
        &self,
        conn: &C,
        ctx: &OperationContext<'_>,
        entities: &[Box<dyn Entity>],
    ) -> BulkResult<()> {
        block_on(self.insert(conn, ctx, entities))
    }

    /// Runs the staged merge protocol for one of the merge operation kinds.
    ///
    /// Entities are mutated in place when output capture reconciles
    /// server-generated values back into them.
    pub async fn merge<C: ConnectionScope>(
        &self,
        conn: &C,
        ctx: &OperationContext<'_>,
        operation: OperationKind,
        entities: &mut [Box<dyn Entity>],
    ) -> BulkResult<()> {
        if !operation.is_merge() {
            bail!(
                ErrorKind::InvalidState,
                "Operation kind is not a merge",
                detail = format!("{operation:?}")
            );
        }

        validate_config(ctx.config)?;
        ctx.check_canceled()?;

        let schema = self.build_schema(ctx, operation)?;
        let buffer = self.materialize(ctx, &schema, entities)?;

        info!(
            table = %ctx.table,
            rows = buffer.len(),
            ?operation,
            "starting bulk merge"
        );

        let mut resources = StagedResources::for_table(&ctx.table);
        let result = self
            .run_merge_protocol(conn, ctx, operation, &schema, &buffer, entities, &mut resources)
            .await;

        self.finish(conn, ctx, resources, result).await
    }

    /// Blocking form of [`BulkMergeOrchestrator::merge`].
    pub fn merge_blocking<C: ConnectionScope>(
        &self,
        conn: &C,
        ctx: &OperationContext<'_>,
        operation: OperationKind,
        entities: &mut [Box<dyn Entity>],
    ) -> BulkResult<()> {
        block_on(self.merge(conn, ctx, operation, entities))
    }

    /// Reads matching target rows back into the caller's entities.
    pub async fn read<C: ConnectionScope>(
        &self,
        conn: &C,
        ctx: &OperationContext<'_>,
        entities: &mut [Box<dyn Entity>],
    ) -> BulkResult<()> {
        validate_config(ctx.config)?;
        ctx.check_canceled()?;

        let schema = self.build_schema(ctx, OperationKind::Read)?;
        let buffer = self.materialize(ctx, &schema, entities)?;

        info!(table = %ctx.table, rows = buffer.len(), "starting bulk read");

        let mut resources = StagedResources::for_table(&ctx.table);
        let result = self
            .run_read_protocol(conn, ctx, &schema, &buffer, entities, &mut resources)
            .await;

        self.finish(conn, ctx, resources, result).await
    }

    /// Blocking form of [`BulkMergeOrchestrator::read`].
    pub fn read_blocking<C: ConnectionScope>(
        &self,
        conn: &C,
        ctx: &OperationContext<'_>,
        entities: &mut [Box<dyn Entity>],
    ) -> BulkResult<()> {
        block_on(self.read(conn, ctx, entities))
    }

    /// Truncates the target table. Idempotent; no staging lifecycle.
    pub async fn truncate<C: ConnectionScope>(
        &self,
        conn: &C,
        ctx: &OperationContext<'_>,
    ) -> BulkResult<()> {
        validate_config(ctx.config)?;
        ctx.check_canceled()?;

        info!(table = %ctx.table, "truncating table");
        let statement = self.statements.truncate(&ctx.table);
        conn.execute(&statement).await?;

        Ok(())
    }

    /// Blocking form of [`BulkMergeOrchestrator::truncate`].
    pub fn truncate_blocking<C: ConnectionScope>(
        &self,
        conn: &C,
        ctx: &OperationContext<'_>,
    ) -> BulkResult<()> {
        block_on(self.truncate(conn, ctx))
    }

    fn build_schema(
        &self,
        ctx: &OperationContext<'_>,
        operation: OperationKind,
    ) -> BulkResult<TableSchema> {
        let builder = ColumnSchemaBuilder::with_strategy(&self.provider, self.discriminator.as_ref());
        builder.build(ctx.table.clone(), ctx.entity_type, operation, ctx.config)
    }

    fn materialize(
        &self,
        ctx: &OperationContext<'_>,
        schema: &TableSchema,
        entities: &[Box<dyn Entity>],
    ) -> BulkResult<RowBuffer> {
        let refs: Vec<&dyn Entity> = entities.iter().map(|e| e.as_ref()).collect();

        let mut materializer = RowMaterializer::new(schema, ctx.config);
        if let Some(resolver) = ctx.shadow_resolver {
            materializer = materializer.with_shadow_resolver(resolver);
        }

        materializer.materialize(&refs)
    }

    /// Hands the buffer to the bulk writer, forwarding progress fractions.
    async fn transfer(
        &self,
        ctx: &OperationContext<'_>,
        dest: &TableName,
        buffer: &RowBuffer,
    ) -> BulkResult<u64> {
        let reporter = ProgressReporter::new(buffer.len() as u64);
        let sink = ctx.progress.clone();
        let on_progress = move |rows: u64| reporter.report(rows, sink.as_ref());

        let writer_config = BulkWriterConfig::from(ctx.config);
        self.writer
            .write(dest, &writer_config, buffer, &on_progress)
            .await
    }

    /// Diagnostic probe after a column-mismatch transfer failure.
    ///
    /// If the destination table is missing, a create+drop of a shadow copy is
    /// issued as a schema-validation probe. The probe never retries the
    /// insert and its own failures are intentionally swallowed; it exists
    /// only to improve the propagated error's diagnostics.
    async fn probe_destination<C: ConnectionScope>(
        &self,
        conn: &C,
        ctx: &OperationContext<'_>,
        schema: &TableSchema,
    ) {
        match conn.table_exists(&ctx.table).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    table = %ctx.table,
                    "destination table missing, issuing schema-validation probe"
                );

                let probe = ctx.table.with_suffix("_schema_probe");
                let create = self
                    .statements
                    .create_table_copy(&ctx.table, &probe, schema, false);
                if let Err(probe_err) = conn.execute(&create).await {
                    debug!(error = %probe_err, "schema-validation probe create failed");
                }
                if let Some(drop) = self.statements.drop_table(&probe, false)
                    && let Err(probe_err) = conn.execute(&drop).await
                {
                    debug!(error = %probe_err, "schema-validation probe drop failed");
                }
            }
            Err(probe_err) => {
                debug!(error = %probe_err, "destination existence probe failed");
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_merge_protocol<C: ConnectionScope>(
        &self,
        conn: &C,
        ctx: &OperationContext<'_>,
        operation: OperationKind,
        schema: &TableSchema,
        buffer: &RowBuffer,
        entities: &mut [Box<dyn Entity>],
        resources: &mut StagedResources,
    ) -> BulkResult<()> {
        // Staging table mirroring the target's columns.
        let create_staging =
            self.statements
                .create_table_copy(&ctx.table, &resources.staging, schema, false);
        conn.execute(&create_staging).await?;
        resources.staging_created = true;
        debug!(staging = %resources.staging, "staging table created");

        ctx.check_canceled()?;
        self.transfer(ctx, &resources.staging, buffer).await?;

        if ctx.config.use_output_table {
            // Delete-result rows carry NULL for every non-key column, so the
            // output table relaxes nullability whenever deletes can happen.
            let create_output = self.statements.create_table_copy(
                &ctx.table,
                &resources.output,
                schema,
                operation.has_delete_semantics(),
            );
            conn.execute(&create_output).await?;
            resources.output_created = true;
            debug!(output = %resources.output, "output table created");
        }

        if ctx.config.keep_identity && schema.identity_column().is_some() {
            let enable = self.statements.set_identity_insert(&ctx.table, true);
            conn.execute(&enable).await?;
            resources.identity_enabled = true;
            debug!(table = %ctx.table, "identity-insert enabled");
        }

        ctx.check_canceled()?;

        let output = resources.output_created.then_some(&resources.output);
        let merge = self.statements.merge(
            schema,
            &resources.staging,
            output,
            operation,
            &schema.server_defaulted_columns(),
        );
        let affected = conn.execute(&merge).await?;
        debug!(affected, "merge statement executed");

        if resources.output_created {
            let select = self.statements.select_output(schema, &resources.output);
            let rows = conn.query(&select).await?;
            reconcile(schema, entities, rows, ReconcileMode::ServerGenerated)?;
        }

        if let Some(post_process) = &ctx.config.custom_post_process {
            ctx.check_canceled()?;
            let statement = crate::statements::Statement::new(post_process.clone());
            conn.execute(&statement).await?;
            debug!("post-process statement executed");
        }

        Ok(())
    }

    async fn run_read_protocol<C: ConnectionScope>(
        &self,
        conn: &C,
        ctx: &OperationContext<'_>,
        schema: &TableSchema,
        buffer: &RowBuffer,
        entities: &mut [Box<dyn Entity>],
        resources: &mut StagedResources,
    ) -> BulkResult<()> {
        let create_staging =
            self.statements
                .create_table_copy(&ctx.table, &resources.staging, schema, false);
        conn.execute(&create_staging).await?;
        resources.staging_created = true;

        ctx.check_canceled()?;
        self.transfer(ctx, &resources.staging, buffer).await?;

        ctx.check_canceled()?;
        let select = self.statements.select_join(schema, &resources.staging);
        let rows = conn.query(&select).await?;

        let mode = if ctx.config.replace_read_entities {
            ReconcileMode::Replace
        } else {
            ReconcileMode::CopyForward
        };
        reconcile(schema, entities, rows, mode)?;

        Ok(())
    }

    /// Runs the guaranteed teardown phase and folds its outcome into the
    /// protocol result.
    ///
    /// Every cleanup step executes even if an earlier one threw; cleanup is
    /// best-effort-all, never short-circuited. Cleanup errors are aggregated
    /// and logged but never mask a primary failure.
    async fn finish<C: ConnectionScope>(
        &self,
        conn: &C,
        ctx: &OperationContext<'_>,
        resources: StagedResources,
        result: BulkResult<()>,
    ) -> BulkResult<()> {
        let mut cleanup_errors = Vec::new();

        if resources.output_created
            && let Some(drop) = self
                .statements
                .drop_table(&resources.output, ctx.config.use_temp_storage)
            && let Err(err) = conn.execute(&drop).await
        {
            cleanup_errors.push(cleanup_error("dropping the output table", err));
        }

        if resources.staging_created
            && let Some(drop) = self
                .statements
                .drop_table(&resources.staging, ctx.config.use_temp_storage)
            && let Err(err) = conn.execute(&drop).await
        {
            cleanup_errors.push(cleanup_error("dropping the staging table", err));
        }

        // Identity-insert is a connection-scoped toggle; it must be turned
        // off exactly once per enable or subsequent operations on the same
        // connection break.
        if resources.identity_enabled {
            let disable = self.statements.set_identity_insert(&ctx.table, false);
            if let Err(err) = conn.execute(&disable).await {
                cleanup_errors.push(cleanup_error("disabling identity-insert", err));
            }
        }

        for cleanup_err in &cleanup_errors {
            error!(error = %cleanup_err, "cleanup step failed");
        }

        match result {
            Err(primary) => Err(primary),
            Ok(()) if cleanup_errors.is_empty() => {
                info!(table = %ctx.table, "bulk operation finished");
                Ok(())
            }
            Ok(()) => Err(BulkError::from(cleanup_errors)),
        }
    }
}

fn validate_config(config: &BulkConfig) -> BulkResult<()> {
    config.validate().map_err(|err| {
        bulk_error!(
            ErrorKind::ConfigInvalid,
            "Bulk configuration failed validation",
            detail = err.to_string()
        )
    })
}

fn cleanup_error(step: &'static str, err: BulkError) -> BulkError {
    bulk_error!(
        ErrorKind::CleanupFailed,
        "Cleanup step failed",
        detail = format!("{step}: {err}"),
        source: err
    )
}

/// How output rows are written back into the caller's entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconcileMode {
    /// Apply only server-generated columns (merge output capture).
    ServerGenerated,
    /// Wholesale-replace every mapped scalar field (Read with replace).
    Replace,
    /// Copy forward matched non-key scalar fields (Read without replace).
    CopyForward,
}

/// Writes captured rows back into the entities they originated from.
///
/// Rows are correlated by key-column tuple when the schema has key columns
/// and every entity carries a non-null key. Rows whose key matches no entity
/// (fresh server-assigned keys) are then paired, in capture order, with the
/// entities no key claimed; rows left over after that have no owner and are
/// dropped rather than written into an already-claimed entity. Without key
/// correlation the whole batch correlates by row position, which is sound
/// because buffer order matches input order. Delete-result rows (all non-key
/// columns NULL) are skipped.
fn reconcile(
    schema: &TableSchema,
    entities: &mut [Box<dyn Entity>],
    rows: Vec<Vec<Value>>,
    mode: ReconcileMode,
) -> BulkResult<()> {
    let columns = schema.columns();
    let key_indexes: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_key)
        .map(|(i, _)| i)
        .collect();

    let by_key = correlation_by_key(schema, entities, &key_indexes)?;

    let mut claimed = vec![false; entities.len()];
    let mut unmatched: Vec<Vec<Value>> = Vec::new();

    for row in rows {
        if row.len() != columns.len() {
            bail!(
                ErrorKind::InvalidData,
                "Captured row width does not match the schema",
                detail = format!("expected {}, got {}", columns.len(), row.len())
            );
        }

        // Delete results carry nothing to reconcile.
        let is_delete_result = !key_indexes.is_empty()
            && row
                .iter()
                .enumerate()
                .all(|(i, v)| key_indexes.contains(&i) || v.is_null());
        if is_delete_result && mode == ReconcileMode::ServerGenerated {
            continue;
        }

        let Some(keys) = &by_key else {
            unmatched.push(row);
            continue;
        };

        let key: Vec<Value> = key_indexes.iter().map(|i| row[*i].clone()).collect();
        match keys.iter().position(|entity_key| *entity_key == key) {
            Some(index) => {
                claimed[index] = true;
                apply_row(columns, entities[index].as_mut(), &row, mode)?;
            }
            None => unmatched.push(row),
        }
    }

    let mut free = (0..entities.len()).filter(|index| !claimed[*index]);
    for row in unmatched {
        let Some(index) = free.next() else {
            break;
        };
        apply_row(columns, entities[index].as_mut(), &row, mode)?;
    }

    Ok(())
}

/// Applies one captured row's reconcilable columns to one entity.
fn apply_row(
    columns: &[crate::schema::ColumnDescriptor],
    entity: &mut dyn Entity,
    row: &[Value],
    mode: ReconcileMode,
) -> BulkResult<()> {
    for (index, column) in columns.iter().enumerate() {
        if column.is_shadow || column.is_discriminator {
            continue;
        }

        let apply = match mode {
            ReconcileMode::Replace => true,
            ReconcileMode::CopyForward => !column.is_key,
            ReconcileMode::ServerGenerated => {
                column.is_identity
                    || column.has_server_default_on_insert
                    || column.is_concurrency_token
            }
        };
        if !apply {
            continue;
        }

        let mut value = row[index].clone();
        if let Some(converter) = &column.converter
            && !value.is_null()
        {
            value = (converter.from_provider)(value)?;
        }

        write_path(entity, &column.path, value)?;
    }

    Ok(())
}

/// Returns per-entity key tuples when key correlation is possible.
fn correlation_by_key(
    schema: &TableSchema,
    entities: &[Box<dyn Entity>],
    key_indexes: &[usize],
) -> BulkResult<Option<Vec<Vec<Value>>>> {
    if key_indexes.is_empty() {
        return Ok(None);
    }

    let columns = schema.columns();
    let mut keys = Vec::with_capacity(entities.len());

    for entity in entities {
        let mut key = Vec::with_capacity(key_indexes.len());
        for index in key_indexes {
            let column = &columns[*index];
            let mut value = extract_path(entity.as_ref(), &column.path)?;
            if let Some(converter) = &column.converter
                && !value.is_null()
            {
                value = (converter.to_provider)(value)?;
            }
            if value.is_null() {
                // Unassigned keys (fresh identity inserts) fall back to
                // positional correlation for the whole batch.
                return Ok(None);
            }
            key.push(value);
        }
        keys.push(key);
    }

    Ok(Some(keys))
}

/// Writes a scalar value through a property path.
///
/// A null nested owned object is skipped silently; there is no object to
/// write into.
fn write_path(
    entity: &mut dyn Entity,
    path: &crate::schema::PropertyPath,
    value: Value,
) -> BulkResult<()> {
    let segments = path.segments();

    let mut current: &mut dyn Entity = entity;
    for segment in &segments[..segments.len() - 1] {
        match current.owned_mut(segment) {
            Some(owned) => current = owned,
            None => return Ok(()),
        }
    }

    current.set(path.leaf(), value)
}

/// Runs an orchestrator future to completion on a private runtime.
///
/// Must not be called from inside an async context; the suspending entry
/// points exist for that.
fn block_on<F>(future: F) -> BulkResult<()>
where
    F: std::future::Future<Output = BulkResult<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(future)
}
