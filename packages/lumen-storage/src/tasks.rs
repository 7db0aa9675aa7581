use crate::{
	Result,
	db::Db,
	models::TaskRow,
	store::{BoxFuture, TaskCatalog, TaskRecord},
};

/// Task lookup against the `tasks` table. Rows with an empty company are public and visible to
/// every company.
pub struct PgTaskCatalog {
	db: Db,
}
impl PgTaskCatalog {
	pub fn new(db: Db) -> Self {
		Self { db }
	}

	async fn lookup(&self, company: &str, task_ids: &[String]) -> Result<Vec<TaskRecord>> {
		if task_ids.is_empty() {
			return Ok(Vec::new());
		}

		let rows: Vec<TaskRow> = sqlx::query_as(
			"\
SELECT id, company, name, status
FROM tasks
WHERE id = ANY($1)
	AND (company = $2 OR company = '')
ORDER BY id",
		)
		.bind(task_ids)
		.bind(company)
		.fetch_all(&self.db.pool)
		.await?;

		Ok(rows
			.into_iter()
			.map(|row| TaskRecord {
				id: row.id,
				company: row.company,
				name: row.name,
				status: row.status,
			})
			.collect())
	}
}
impl TaskCatalog for PgTaskCatalog {
	fn resolve<'a>(
		&'a self,
		company: &'a str,
		task_ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<TaskRecord>>> {
		Box::pin(self.lookup(company, task_ids))
	}
}
