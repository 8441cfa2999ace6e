// Postgres listing store over the `hostels` table.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, warn};

use roomscout_common::{
    Coordinates, Listing, ListingUpdate, NewListing, PostedBy, ProvenanceField, UpsertOutcome,
    Utilities,
};

use crate::traits::ListingStore;

pub struct PgListingStore {
    pool: PgPool,
}

/// A row from the hostels table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ListingRow {
    id: String,
    title: String,
    description: String,
    thumbnail: String,
    address: String,
    district: String,
    ward: Option<String>,
    price: i64,
    area: f64,
    posted_by: Json<PostedBy>,
    posted_at: DateTime<Utc>,
    fb_link: String,
    fb_group_name: String,
    coordinates: Option<Json<Coordinates>>,
    amenities: Vec<String>,
    rules: Vec<String>,
    images: Vec<String>,
    contact_phone: Option<String>,
    deposit_required: Option<i64>,
    utilities: Json<Utilities>,
    room_type: Option<String>,
    available: bool,
    raw_fb_data: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ListingRow> for Listing {
    fn from(row: ListingRow) -> Self {
        let room_type = row.room_type.as_deref().and_then(|r| match r.parse() {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(id = %row.id, error = %e, "Ignoring stored room type");
                None
            }
        });
        Listing {
            id: row.id,
            title: row.title,
            description: row.description,
            thumbnail: row.thumbnail,
            address: row.address,
            district: row.district,
            ward: row.ward,
            price: row.price,
            area: row.area,
            posted_by: row.posted_by.0,
            posted_at: row.posted_at,
            fb_link: row.fb_link,
            fb_group_name: row.fb_group_name,
            coordinates: row.coordinates.map(|c| c.0),
            amenities: row.amenities,
            rules: row.rules,
            images: row.images,
            contact_phone: row.contact_phone,
            deposit_required: row.deposit_required,
            utilities: row.utilities.0,
            room_type,
            available: row.available,
            raw_fb_data: row.raw_fb_data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PgListingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ListingStore for PgListingStore {
    async fn find_by_key(&self, id: &str) -> Result<Option<Listing>> {
        let row = sqlx::query_as::<_, ListingRow>("SELECT * FROM hostels WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Listing::from))
    }

    async fn find_by_provenance_field(
        &self,
        field: ProvenanceField,
        value: &str,
        created_after: Option<DateTime<Utc>>,
    ) -> Result<Option<Listing>> {
        // The key is inlined so the expression indexes apply.
        let sql = format!(
            r#"
            SELECT * FROM hostels
            WHERE raw_fb_data->>'{key}' = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
            key = field.json_key()
        );
        let row = sqlx::query_as::<_, ListingRow>(&sql)
            .bind(value)
            .bind(created_after)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Listing::from))
    }

    async fn create_or_update(
        &self,
        create: &NewListing,
        update: &ListingUpdate,
    ) -> Result<UpsertOutcome> {
        let inserted = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO hostels
                (id, title, description, thumbnail, address, district, ward,
                 price, area, posted_by, posted_at, fb_link, fb_group_name,
                 coordinates, amenities, rules, images, contact_phone,
                 deposit_required, utilities, room_type, available, raw_fb_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
            ON CONFLICT (id) DO UPDATE SET
                title = $24,
                description = $25,
                price = $26,
                available = $27,
                thumbnail = $28,
                images = $29,
                raw_fb_data = $30,
                updated_at = now()
            RETURNING (xmax = 0)
            "#,
        )
        .bind(&create.id)
        .bind(&create.title)
        .bind(&create.description)
        .bind(&create.thumbnail)
        .bind(&create.address)
        .bind(&create.district)
        .bind(&create.ward)
        .bind(create.price)
        .bind(create.area)
        .bind(Json(&create.posted_by))
        .bind(create.posted_at)
        .bind(&create.fb_link)
        .bind(&create.fb_group_name)
        .bind(create.coordinates.as_ref().map(Json))
        .bind(&create.amenities)
        .bind(&create.rules)
        .bind(&create.images)
        .bind(&create.contact_phone)
        .bind(create.deposit_required)
        .bind(Json(&create.utilities))
        .bind(create.room_type.map(|r| r.as_str()))
        .bind(create.available)
        .bind(&create.raw_fb_data)
        .bind(&update.title)
        .bind(&update.description)
        .bind(update.price)
        .bind(update.available)
        .bind(&update.thumbnail)
        .bind(&update.images)
        .bind(&update.raw_fb_data)
        .fetch_one(&self.pool)
        .await?;

        let outcome = if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        };
        debug!(id = %create.id, ?outcome, "Upserted listing");
        Ok(outcome)
    }

    async fn create_if_absent(&self, create: &NewListing) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO hostels
                (id, title, description, thumbnail, address, district, ward,
                 price, area, posted_by, posted_at, fb_link, fb_group_name,
                 coordinates, amenities, rules, images, contact_phone,
                 deposit_required, utilities, room_type, available, raw_fb_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&create.id)
        .bind(&create.title)
        .bind(&create.description)
        .bind(&create.thumbnail)
        .bind(&create.address)
        .bind(&create.district)
        .bind(&create.ward)
        .bind(create.price)
        .bind(create.area)
        .bind(Json(&create.posted_by))
        .bind(create.posted_at)
        .bind(&create.fb_link)
        .bind(&create.fb_group_name)
        .bind(create.coordinates.as_ref().map(Json))
        .bind(&create.amenities)
        .bind(&create.rules)
        .bind(&create.images)
        .bind(&create.contact_phone)
        .bind(create.deposit_required)
        .bind(Json(&create.utilities))
        .bind(create.room_type.map(|r| r.as_str()))
        .bind(create.available)
        .bind(&create.raw_fb_data)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() == 1;
        debug!(id = %create.id, inserted, "Inserted listing if absent");
        Ok(inserted)
    }

    async fn soft_delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE hostels SET available = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
