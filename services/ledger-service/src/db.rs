use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cl_api_types::{EventId, Metadata, TransactionKind, TransactionRecord, UserId, WithdrawalStatus};
use cl_ledger::{CreditOutcome, DebitOutcome, LedgerError, WalletBalances, allocate_debit};
use cl_storage::{BookmarkState, LedgerStore};
use cl_withdrawals::{WithdrawalRequest, WithdrawalSchedule};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};
use tracing::warn;
use uuid::Uuid;

/// Single-connection repository. The mutex gives every operation
/// exclusive use of the connection, so a debit's SELECT FOR UPDATE,
/// guarded UPDATE, and journal INSERT always share one transaction.
pub(crate) struct PostgresRepository {
    client: Mutex<Client>,
}

impl PostgresRepository {
    pub(crate) async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .context("failed to connect to Postgres")?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!("postgres connection error: {}", err);
            }
        });

        Ok(Self {
            client: Mutex::new(client),
        })
    }

    pub(crate) async fn run_migrations_from_dir(&self, migrations_dir: &str) -> anyhow::Result<usize> {
        let mut files: Vec<PathBuf> = fs::read_dir(migrations_dir)
            .with_context(|| format!("failed to read migrations directory: {migrations_dir}"))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|value| value.to_str()) == Some("sql"))
            .collect();

        files.sort();

        let client = self.client.lock().await;
        for file_path in &files {
            let sql = fs::read_to_string(file_path)
                .with_context(|| format!("failed to read migration file: {}", file_path.display()))?;
            client
                .batch_execute(&sql)
                .await
                .with_context(|| format!("failed to execute migration file: {}", file_path.display()))?;
        }

        Ok(files.len())
    }
}

fn to_i64(value: u64) -> i64 {
    value.min(i64::MAX as u64) as i64
}

fn from_i64(value: i64) -> u64 {
    if value < 0 { 0 } else { value as u64 }
}

fn row_to_balances(row: &Row) -> WalletBalances {
    WalletBalances {
        paid: from_i64(row.get::<_, i64>(0)),
        free: from_i64(row.get::<_, i64>(1)),
    }
}

fn row_to_transaction(row: &Row) -> anyhow::Result<TransactionRecord> {
    let kind_raw: String = row.get(3);
    let kind = TransactionKind::parse(&kind_raw)
        .ok_or_else(|| anyhow!("unknown transaction kind in journal: {kind_raw}"))?;
    let metadata: Value = row.get(5);

    Ok(TransactionRecord {
        id: row.get(0),
        user_id: UserId(row.get(1)),
        amount: row.get(2),
        kind,
        description: row.get(4),
        metadata: metadata.as_object().cloned().unwrap_or_default(),
        created_at: row.get(6),
    })
}

fn row_to_withdrawal(row: &Row) -> anyhow::Result<WithdrawalRequest> {
    let status_raw: String = row.get(5);
    let status = WithdrawalStatus::parse(&status_raw)
        .ok_or_else(|| anyhow!("unknown withdrawal status: {status_raw}"))?;

    Ok(WithdrawalRequest {
        id: row.get(0),
        organizer_id: UserId(row.get(1)),
        amount_gross: from_i64(row.get::<_, i64>(2)),
        fees: from_i64(row.get::<_, i64>(3)),
        amount_net: from_i64(row.get::<_, i64>(4)),
        status,
        requested_at: row.get(6),
    })
}

const WITHDRAWAL_COLUMNS: &str =
    "id, organizer_id, amount_gross, fees, amount_net, status, requested_at";

#[async_trait]
impl LedgerStore for PostgresRepository {
    async fn wallet_balances(&self, user: &UserId) -> anyhow::Result<WalletBalances> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT paid_balance, free_balance FROM wallets WHERE user_id = $1",
                &[&user.0],
            )
            .await
            .context("failed to read wallet balances")?;

        Ok(row.map(|row| row_to_balances(&row)).unwrap_or_default())
    }

    async fn debit(
        &self,
        user: &UserId,
        amount: u64,
        kind: TransactionKind,
        description: &str,
        mut metadata: Metadata,
    ) -> Result<DebitOutcome, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if kind.is_credit() {
            return Err(LedgerError::InvalidKind {
                kind: kind.as_str(),
            });
        }

        let mut client = self.client.lock().await;
        let tx = client
            .transaction()
            .await
            .context("failed to begin debit transaction")?;

        let row = tx
            .query_opt(
                "SELECT paid_balance, free_balance FROM wallets WHERE user_id = $1 FOR UPDATE",
                &[&user.0],
            )
            .await
            .context("failed to lock wallet row")?;
        let balances = row.map(|row| row_to_balances(&row)).unwrap_or_default();

        let Some(allocation) = allocate_debit(balances, amount) else {
            // dropping the transaction rolls it back
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: balances.total(),
            });
        };

        // The guard predicate is the only mutation path; there is no
        // unconditional overwrite to fall back to.
        let updated = tx
            .execute(
                "UPDATE wallets
                 SET paid_balance = paid_balance - $2,
                     free_balance = free_balance - $3,
                     updated_at = NOW()
                 WHERE user_id = $1 AND paid_balance >= $2 AND free_balance >= $3",
                &[
                    &user.0,
                    &to_i64(allocation.paid_used),
                    &to_i64(allocation.free_used),
                ],
            )
            .await
            .context("failed to apply debit")?;

        if updated != 1 {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: balances.total(),
            });
        }

        metadata.insert("free_used".to_owned(), allocation.free_used.into());
        metadata.insert("paid_used".to_owned(), allocation.paid_used.into());

        let transaction_id = Uuid::new_v4();
        let created_at: DateTime<Utc> = Utc::now();
        tx.execute(
            "INSERT INTO coin_transactions (id, user_id, amount, kind, description, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &transaction_id,
                &user.0,
                &-(to_i64(amount)),
                &kind.as_str(),
                &description,
                &Value::Object(metadata),
                &created_at,
            ],
        )
        .await
        .context("failed to journal debit")?;

        tx.commit().await.context("failed to commit debit")?;

        Ok(DebitOutcome {
            transaction_id,
            allocation,
            balances_after: balances.after_debit(allocation),
        })
    }

    async fn credit(
        &self,
        user: &UserId,
        amount: u64,
        kind: TransactionKind,
        description: &str,
        metadata: Metadata,
    ) -> Result<CreditOutcome, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if !kind.is_credit() {
            return Err(LedgerError::InvalidKind {
                kind: kind.as_str(),
            });
        }

        let (paid_delta, free_delta) = match kind {
            TransactionKind::Purchase => (to_i64(amount), 0_i64),
            _ => (0_i64, to_i64(amount)),
        };

        let mut client = self.client.lock().await;
        let tx = client
            .transaction()
            .await
            .context("failed to begin credit transaction")?;

        let row = tx
            .query_one(
                "INSERT INTO wallets (user_id, paid_balance, free_balance)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (user_id) DO UPDATE SET
                   paid_balance = wallets.paid_balance + EXCLUDED.paid_balance,
                   free_balance = wallets.free_balance + EXCLUDED.free_balance,
                   updated_at = NOW()
                 RETURNING paid_balance, free_balance",
                &[&user.0, &paid_delta, &free_delta],
            )
            .await
            .context("failed to apply credit")?;
        let balances_after = row_to_balances(&row);

        let transaction_id = Uuid::new_v4();
        let created_at: DateTime<Utc> = Utc::now();
        tx.execute(
            "INSERT INTO coin_transactions (id, user_id, amount, kind, description, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &transaction_id,
                &user.0,
                &to_i64(amount),
                &kind.as_str(),
                &description,
                &Value::Object(metadata),
                &created_at,
            ],
        )
        .await
        .context("failed to journal credit")?;

        tx.commit().await.context("failed to commit credit")?;

        Ok(CreditOutcome {
            transaction_id,
            balances_after,
        })
    }

    async fn transactions(
        &self,
        user: &UserId,
        limit: usize,
        kind: Option<TransactionKind>,
    ) -> anyhow::Result<Vec<TransactionRecord>> {
        let client = self.client.lock().await;
        let kind = kind.map(|kind| kind.as_str());
        let rows = client
            .query(
                "SELECT id, user_id, amount, kind, description, metadata, created_at
                 FROM coin_transactions
                 WHERE user_id = $1 AND ($2::TEXT IS NULL OR kind = $2)
                 ORDER BY created_at DESC
                 LIMIT $3",
                &[&user.0, &kind, &(limit as i64)],
            )
            .await
            .context("failed to list transactions")?;

        rows.iter().map(row_to_transaction).collect()
    }

    async fn latest_rate(&self) -> anyhow::Result<Option<u64>> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT fcfa_per_coin FROM coin_rates ORDER BY created_at DESC LIMIT 1",
                &[],
            )
            .await
            .context("failed to read latest coin rate")?;

        Ok(row.map(|row| from_i64(row.get::<_, i64>(0))))
    }

    async fn toggle_bookmark(&self, user: &UserId, event: &EventId) -> anyhow::Result<BookmarkState> {
        let mut client = self.client.lock().await;
        let tx = client
            .transaction()
            .await
            .context("failed to begin bookmark toggle")?;

        let removed = tx
            .execute(
                "DELETE FROM bookmarks WHERE user_id = $1 AND event_id = $2",
                &[&user.0, &event.0],
            )
            .await
            .context("failed to clear bookmark")?;

        let is_bookmarked = removed == 0;
        if is_bookmarked {
            tx.execute(
                "INSERT INTO bookmarks (user_id, event_id) VALUES ($1, $2)
                 ON CONFLICT (user_id, event_id) DO NOTHING",
                &[&user.0, &event.0],
            )
            .await
            .context("failed to set bookmark")?;
        }

        let count_row = tx
            .query_one(
                "SELECT COUNT(*) FROM bookmarks WHERE event_id = $1",
                &[&event.0],
            )
            .await
            .context("failed to count bookmarks")?;
        let count = from_i64(count_row.get::<_, i64>(0));

        tx.commit().await.context("failed to commit bookmark toggle")?;

        Ok(BookmarkState {
            is_bookmarked,
            count,
        })
    }

    async fn bookmark_count(&self, event: &EventId) -> anyhow::Result<u64> {
        let client = self.client.lock().await;
        let row = client
            .query_one(
                "SELECT COUNT(*) FROM bookmarks WHERE event_id = $1",
                &[&event.0],
            )
            .await
            .context("failed to count bookmarks")?;
        Ok(from_i64(row.get::<_, i64>(0)))
    }

    async fn withdrawal_schedule(&self) -> anyhow::Result<Option<WithdrawalSchedule>> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT allowed_days FROM withdrawal_schedule WHERE id = 1",
                &[],
            )
            .await
            .context("failed to read withdrawal schedule")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let days: Vec<i32> = row.get(0);
        let schedule = WithdrawalSchedule::new(days.into_iter().map(|day| day.clamp(0, 255) as u8))
            .map_err(|err| anyhow!("stored withdrawal schedule is invalid: {err}"))?;
        Ok(Some(schedule))
    }

    async fn save_withdrawal_schedule(&self, schedule: &WithdrawalSchedule) -> anyhow::Result<()> {
        let days: Vec<i32> = schedule
            .allowed_days()
            .into_iter()
            .map(i32::from)
            .collect();

        let client = self.client.lock().await;
        client
            .execute(
                "INSERT INTO withdrawal_schedule (id, allowed_days, updated_at)
                 VALUES (1, $1, NOW())
                 ON CONFLICT (id) DO UPDATE SET
                   allowed_days = EXCLUDED.allowed_days,
                   updated_at = NOW()",
                &[&days],
            )
            .await
            .context("failed to save withdrawal schedule")?;
        Ok(())
    }

    async fn create_withdrawal(&self, request: &WithdrawalRequest) -> anyhow::Result<()> {
        let client = self.client.lock().await;
        client
            .execute(
                "INSERT INTO withdrawal_requests
                 (id, organizer_id, amount_gross, fees, amount_net, status, requested_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &request.id,
                    &request.organizer_id.0,
                    &to_i64(request.amount_gross),
                    &to_i64(request.fees),
                    &to_i64(request.amount_net),
                    &request.status.as_str(),
                    &request.requested_at,
                ],
            )
            .await
            .context("failed to create withdrawal request")?;
        Ok(())
    }

    async fn withdrawal(&self, id: Uuid) -> anyhow::Result<Option<WithdrawalRequest>> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = $1")
                    .as_str(),
                &[&id],
            )
            .await
            .context("failed to load withdrawal request")?;

        row.as_ref().map(row_to_withdrawal).transpose()
    }

    async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
        limit: usize,
    ) -> anyhow::Result<Vec<WithdrawalRequest>> {
        let client = self.client.lock().await;
        let status = status.map(|status| status.as_str());
        let rows = client
            .query(
                format!(
                    "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests
                     WHERE ($1::TEXT IS NULL OR status = $1)
                     ORDER BY requested_at DESC
                     LIMIT $2"
                )
                .as_str(),
                &[&status, &(limit as i64)],
            )
            .await
            .context("failed to list withdrawal requests")?;

        rows.iter().map(row_to_withdrawal).collect()
    }

    async fn set_withdrawal_status(
        &self,
        id: Uuid,
        next: WithdrawalStatus,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let mut client = self.client.lock().await;
        let tx = client
            .transaction()
            .await
            .context("failed to begin withdrawal status update")?;

        let row = tx
            .query_opt(
                format!(
                    "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests
                     WHERE id = $1 FOR UPDATE"
                )
                .as_str(),
                &[&id],
            )
            .await
            .context("failed to lock withdrawal request")?
            .ok_or(LedgerError::WithdrawalNotFound(id))?;

        let mut request = row_to_withdrawal(&row)?;
        if !request.status.can_transition_to(next) {
            return Err(LedgerError::InvalidTransition {
                from: request.status,
                to: next,
            });
        }

        tx.execute(
            "UPDATE withdrawal_requests SET status = $2 WHERE id = $1",
            &[&id, &next.as_str()],
        )
        .await
        .context("failed to update withdrawal status")?;

        tx.commit()
            .await
            .context("failed to commit withdrawal status update")?;

        request.status = next;
        Ok(request)
    }
}
