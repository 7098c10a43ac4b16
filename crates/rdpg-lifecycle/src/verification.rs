//! CRUD verification of one schema through the application
//!
//! The same sequence runs against the built-in schema and a freshly created
//! one: create, populate, read back, update, read back, delete, confirm
//! absence, drop.

use crate::error::LifecycleError;
use crate::identifier::{FirstChar, IdentifierGenerator};
use crate::pattern;
use crate::polling::Poller;
use crate::probe::AppEndpoints;
use crate::sql::{RowValue, SchemaTarget, TableRef};
use tracing::info;

/// CRUD sequence bound to one application
pub(crate) struct CrudSequence<'a> {
    poller: &'a Poller,
    endpoints: &'a AppEndpoints,
    num_insertions: usize,
}

impl<'a> CrudSequence<'a> {
    pub(crate) fn new(poller: &'a Poller, endpoints: &'a AppEndpoints, num_insertions: usize) -> Self {
        Self {
            poller,
            endpoints,
            num_insertions,
        }
    }

    /// Run the whole sequence against `target`
    ///
    /// Stops at the first failing assertion.
    pub(crate) async fn run(
        &self,
        target: &SchemaTarget,
        generator: &mut IdentifierGenerator,
    ) -> Result<(), LifecycleError> {
        self.check_connectivity().await?;

        if let Some(sql) = target.create_statement() {
            info!("--Creating new schema: {}", target);
            self.exec_ok(&sql).await?;
        }

        let table = target.table(generator.generate_relation());
        info!("--Creating table: {}", table);
        self.exec_ok(&table.create()).await?;

        let rows: Vec<RowValue> = generator
            .generate_batch(self.num_insertions, FirstChar::Any)?
            .into_iter()
            .zip(0i64..)
            .map(|(key, value)| RowValue::new(key, value))
            .collect();

        info!("--Inserting {} entries into {}", rows.len(), table);
        self.exec_ok(&table.insert_batch(&rows)).await?;

        info!("--Polling each inserted entry to verify its presence in {}", table);
        self.expect_rows(&table, &rows).await?;

        let updated: Vec<RowValue> = rows.iter().map(RowValue::incremented).collect();
        info!("--Updating the values of each of the rows in {}", table);
        self.exec_ok(&table.update_batch(&updated)).await?;

        info!("--Polling each updated entry in {}", table);
        self.expect_rows(&table, &updated).await?;

        info!("--Verifying that the pre-updated values are not still in {}", table);
        for row in &rows {
            let forbidden = pattern::absence(row.key.as_str(), row.value).or(pattern::failure());
            self.poller
                .consistently_not(&self.endpoints.exec(table.select_key(&row.key)), &forbidden)
                .await?;
        }

        info!("--Clearing all the table entries out of {}", table);
        self.exec_ok(&table.delete_batch(&updated)).await?;

        // Zero rows print nothing, not even `[]`.
        info!("--Verifying that the entries are no longer present in {}", table);
        self.poller
            .consistently_not(
                &self.endpoints.exec(table.select_all()),
                &pattern::empty_result().or(pattern::failure()),
            )
            .await?;

        info!("--Dropping table {}", table);
        self.exec_ok(&table.drop_statement()).await?;

        info!("--Verifying that table {} was deleted", table);
        self.poller
            .eventually(&self.endpoints.exec(table.select_all()), &pattern::failure())
            .await?;

        if let Some(sql) = target.drop_statement() {
            info!("--Dropping schema {}", target);
            self.exec_ok(&sql).await?;

            info!("--Verifying that schema {} was dropped", target);
            self.poller
                .consistently_not(
                    &self.endpoints.exec(target.catalog_lookup()),
                    &pattern::empty_result().or(pattern::failure()),
                )
                .await?;
        }

        Ok(())
    }

    async fn check_connectivity(&self) -> Result<(), LifecycleError> {
        info!("--Displaying database uri");
        self.poller
            .eventually(&self.endpoints.uri(), &pattern::success())
            .await?;

        info!("--Checking if a connection to the database can be made");
        self.poller
            .eventually(&self.endpoints.timestamp(), &pattern::success())
            .await
    }

    async fn exec_ok(&self, sql: &str) -> Result<(), LifecycleError> {
        self.poller
            .eventually(&self.endpoints.exec(sql), &pattern::success())
            .await
    }

    async fn expect_rows(&self, table: &TableRef, rows: &[RowValue]) -> Result<(), LifecycleError> {
        for row in rows {
            self.poller
                .eventually(
                    &self.endpoints.exec(table.select_key(&row.key)),
                    &pattern::expected_row(row.key.as_str(), row.value),
                )
                .await?;
        }
        Ok(())
    }
}
