use sqlx::PgPool;

use crate::config::PostgresConfig;

/// Run database migrations, creating the items table, its reclamation index,
/// and the atomic consume function if they do not exist.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    let items_table = config.items_table();
    let consume_fn = config.consume_function();
    let reclaim_index = config.reclaim_index();

    let create_items = format!(
        "CREATE TABLE IF NOT EXISTS {items_table} (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            content_type TEXT NOT NULL,
            blob_path TEXT,
            expiry_at TIMESTAMPTZ,
            max_views INTEGER CHECK (max_views IS NULL OR max_views > 0),
            views INTEGER NOT NULL DEFAULT 0,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            is_removed BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CHECK (max_views IS NULL OR views <= max_views),
            CHECK (NOT is_removed OR blob_path IS NULL)
        )"
    );

    let create_reclaim_index = format!(
        "CREATE INDEX IF NOT EXISTS {reclaim_index} \
         ON {items_table} (expiry_at) WHERE blob_path IS NOT NULL"
    );

    // Row lock, decision and update happen inside one function call so the
    // client needs a single round trip.
    let create_consume_fn = format!(
        "CREATE OR REPLACE FUNCTION {consume_fn}(p_id TEXT, p_now TIMESTAMPTZ)
        RETURNS TABLE (
            status TEXT,
            blob_path TEXT,
            expiry_at TIMESTAMPTZ,
            remaining_views INTEGER,
            will_deactivate BOOLEAN
        )
        LANGUAGE plpgsql
        AS $$
        DECLARE
            r {items_table}%ROWTYPE;
            new_views INTEGER;
            last_view BOOLEAN;
        BEGIN
            SELECT * INTO r FROM {items_table} t WHERE t.id = p_id FOR UPDATE;

            IF NOT FOUND OR r.is_removed THEN
                RETURN QUERY SELECT 'not_found'::TEXT, NULL::TEXT, NULL::TIMESTAMPTZ, NULL::INTEGER, FALSE;
                RETURN;
            END IF;

            IF NOT r.is_active
                OR (r.expiry_at IS NOT NULL AND r.expiry_at <= p_now)
                OR (r.max_views IS NOT NULL AND r.views >= r.max_views) THEN
                RETURN QUERY SELECT 'expired'::TEXT, NULL::TEXT, NULL::TIMESTAMPTZ, NULL::INTEGER, FALSE;
                RETURN;
            END IF;

            new_views := r.views + 1;
            last_view := r.max_views IS NOT NULL AND new_views = r.max_views;

            UPDATE {items_table} t
            SET views = new_views,
                is_active = CASE WHEN last_view THEN FALSE ELSE t.is_active END
            WHERE t.id = p_id;

            RETURN QUERY SELECT
                'ok'::TEXT,
                r.blob_path,
                r.expiry_at,
                CASE WHEN r.max_views IS NULL THEN NULL::INTEGER ELSE r.max_views - new_views END,
                last_view;
        END;
        $$"
    );

    sqlx::query(&create_items).execute(pool).await?;
    sqlx::query(&create_reclaim_index).execute(pool).await?;
    sqlx::query(&create_consume_fn).execute(pool).await?;

    Ok(())
}
