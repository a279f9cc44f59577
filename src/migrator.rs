use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_training_tables::Migration),
            Box::new(m20240301_000002_create_booking_tables::Migration),
            Box::new(m20240301_000003_create_catalog_tables::Migration),
            Box::new(m20240301_000004_create_cart_tables::Migration),
            Box::new(m20240301_000005_create_order_tables::Migration),
            Box::new(m20240301_000006_create_inventory_movements_table::Migration),
            Box::new(m20240301_000007_create_payment_transactions_table::Migration),
        ]
    }
}

mod m20240301_000001_create_training_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_training_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Trainers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Trainers::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Trainers::Name).string().not_null())
                        .col(ColumnDef::new(Trainers::Email).string().not_null())
                        .col(ColumnDef::new(Trainers::Bio).text())
                        .col(ColumnDef::new(Trainers::Specializations).json().not_null())
                        .col(
                            ColumnDef::new(Trainers::HourlyRate)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Trainers::ImageUrl).string())
                        .col(
                            ColumnDef::new(Trainers::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Trainers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Trainers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SessionTypes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SessionTypes::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(SessionTypes::Name).string().not_null())
                        .col(ColumnDef::new(SessionTypes::Description).text())
                        .col(
                            ColumnDef::new(SessionTypes::BasePrice)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SessionTypes::DurationOptions)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SessionTypes::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Sessions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Sessions::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Sessions::SessionTypeId).integer().not_null())
                        .col(ColumnDef::new(Sessions::TrainerId).integer().not_null())
                        .col(ColumnDef::new(Sessions::Date).date().not_null())
                        .col(ColumnDef::new(Sessions::StartTime).time().not_null())
                        .col(ColumnDef::new(Sessions::EndTime).time().not_null())
                        .col(
                            ColumnDef::new(Sessions::DurationMinutes)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Sessions::Price)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Sessions::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Sessions::MaxParticipants)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Sessions::CurrentParticipants)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Sessions::Notes).text())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sessions_session_type_id")
                                .from(Sessions::Table, Sessions::SessionTypeId)
                                .to(SessionTypes::Table, SessionTypes::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sessions_trainer_id")
                                .from(Sessions::Table, Sessions::TrainerId)
                                .to(Trainers::Table, Trainers::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_sessions_date_status")
                        .table(Sessions::Table)
                        .col(Sessions::Date)
                        .col(Sessions::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Sessions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SessionTypes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Trainers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Trainers {
        Table,
        Id,
        Name,
        Email,
        Bio,
        Specializations,
        HourlyRate,
        ImageUrl,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum SessionTypes {
        Table,
        Id,
        Name,
        Description,
        BasePrice,
        DurationOptions,
        IsActive,
    }

    #[derive(DeriveIden)]
    pub enum Sessions {
        Table,
        Id,
        SessionTypeId,
        TrainerId,
        Date,
        StartTime,
        EndTime,
        DurationMinutes,
        Price,
        Status,
        MaxParticipants,
        CurrentParticipants,
        Notes,
    }
}

mod m20240301_000002_create_booking_tables {
    use super::m20240301_000001_create_training_tables::Sessions;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_booking_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Bookings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Bookings::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Bookings::BookingNumber).string().not_null())
                        .col(ColumnDef::new(Bookings::ClientName).string().not_null())
                        .col(ColumnDef::new(Bookings::ClientEmail).string().not_null())
                        .col(ColumnDef::new(Bookings::ClientPhone).string().not_null())
                        .col(
                            ColumnDef::new(Bookings::TotalAmount)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::TermsAccepted)
                                .boolean()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Bookings::SpecialRequests).text())
                        .col(
                            ColumnDef::new(Bookings::BookingStatus)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::PaymentStatus)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Bookings::PaymentMethod).string())
                        .col(
                            ColumnDef::new(Bookings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // The uniqueness guarantee for booking numbers lives here, not in
            // application-side lookups.
            manager
                .create_index(
                    Index::create()
                        .name("idx_bookings_booking_number")
                        .table(Bookings::Table)
                        .col(Bookings::BookingNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BookingSessions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BookingSessions::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(BookingSessions::BookingId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BookingSessions::SessionId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BookingSessions::Price)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BookingSessions::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_booking_sessions_booking_id")
                                .from(BookingSessions::Table, BookingSessions::BookingId)
                                .to(Bookings::Table, Bookings::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_booking_sessions_session_id")
                                .from(BookingSessions::Table, BookingSessions::SessionId)
                                .to(Sessions::Table, Sessions::Id),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BookingSessions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Bookings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Bookings {
        Table,
        Id,
        BookingNumber,
        ClientName,
        ClientEmail,
        ClientPhone,
        TotalAmount,
        TermsAccepted,
        SpecialRequests,
        BookingStatus,
        PaymentStatus,
        PaymentMethod,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum BookingSessions {
        Table,
        Id,
        BookingId,
        SessionId,
        Price,
        Status,
    }
}

mod m20240301_000003_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Categories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Categories::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Categories::ParentId).integer())
                        .col(ColumnDef::new(Categories::Name).string().not_null())
                        .col(ColumnDef::new(Categories::Slug).string().not_null())
                        .col(ColumnDef::new(Categories::Description).text())
                        .col(
                            ColumnDef::new(Categories::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Categories::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::CategoryId).integer())
                        .col(ColumnDef::new(Products::Sku).string().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Slug).string().not_null())
                        .col(ColumnDef::new(Products::ShortDescription).text())
                        .col(ColumnDef::new(Products::Description).text())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Products::ComparePrice).decimal_len(10, 2))
                        .col(
                            ColumnDef::new(Products::InventoryQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::TrackInventory)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::LowStockThreshold)
                                .integer()
                                .not_null()
                                .default(5),
                        )
                        .col(ColumnDef::new(Products::Weight).double())
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::IsFeatured)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Products::Tags).json())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_products_category_id")
                                .from(Products::Table, Products::CategoryId)
                                .to(Categories::Table, Categories::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_products_sku")
                        .table(Products::Table)
                        .col(Products::Sku)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductVariants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductVariants::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::ProductId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductVariants::Sku).string().not_null())
                        .col(ColumnDef::new(ProductVariants::Name).string().not_null())
                        .col(ColumnDef::new(ProductVariants::Price).decimal_len(10, 2))
                        .col(ColumnDef::new(ProductVariants::ComparePrice).decimal_len(10, 2))
                        .col(
                            ColumnDef::new(ProductVariants::InventoryQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ProductVariants::Attributes).json())
                        .col(
                            ColumnDef::new(ProductVariants::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_variants_product_id")
                                .from(ProductVariants::Table, ProductVariants::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_product_variants_sku")
                        .table(ProductVariants::Table)
                        .col(ProductVariants::Sku)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductImages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductImages::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ProductImages::ProductId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductImages::ImageUrl).string().not_null())
                        .col(ColumnDef::new(ProductImages::AltText).string())
                        .col(
                            ColumnDef::new(ProductImages::IsPrimary)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ProductImages::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_images_product_id")
                                .from(ProductImages::Table, ProductImages::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductImages::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductVariants::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Categories::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Categories {
        Table,
        Id,
        ParentId,
        Name,
        Slug,
        Description,
        SortOrder,
        IsActive,
    }

    #[derive(DeriveIden)]
    pub enum Products {
        Table,
        Id,
        CategoryId,
        Sku,
        Name,
        Slug,
        ShortDescription,
        Description,
        Price,
        ComparePrice,
        InventoryQuantity,
        TrackInventory,
        LowStockThreshold,
        Weight,
        IsActive,
        IsFeatured,
        Tags,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum ProductVariants {
        Table,
        Id,
        ProductId,
        Sku,
        Name,
        Price,
        ComparePrice,
        InventoryQuantity,
        Attributes,
        IsActive,
    }

    #[derive(DeriveIden)]
    pub enum ProductImages {
        Table,
        Id,
        ProductId,
        ImageUrl,
        AltText,
        IsPrimary,
        SortOrder,
    }
}

mod m20240301_000004_create_cart_tables {
    use super::m20240301_000003_create_catalog_tables::{ProductVariants, Products};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_cart_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CartSessions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartSessions::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(CartSessions::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartSessions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartSessions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartItems::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(CartItems::CartSessionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::ProductId).integer().not_null())
                        .col(ColumnDef::new(CartItems::ProductVariantId).integer())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(CartItems::Price)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_cart_session_id")
                                .from(CartItems::Table, CartItems::CartSessionId)
                                .to(CartSessions::Table, CartSessions::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_product_id")
                                .from(CartItems::Table, CartItems::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_product_variant_id")
                                .from(CartItems::Table, CartItems::ProductVariantId)
                                .to(ProductVariants::Table, ProductVariants::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Coupons::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Coupons::Code).string().not_null())
                        .col(ColumnDef::new(Coupons::CouponType).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Coupons::Value)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::MinimumAmount)
                                .decimal_len(10, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Coupons::UsageLimit).integer())
                        .col(
                            ColumnDef::new(Coupons::UsageCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Coupons::StartsAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Coupons::ExpiresAt).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(Coupons::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_coupons_code")
                        .table(Coupons::Table)
                        .col(Coupons::Code)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // Applied coupons are persisted per cart session (one at most)
            // rather than held in process memory.
            manager
                .create_table(
                    Table::create()
                        .table(CartCoupons::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartCoupons::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(CartCoupons::CartSessionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartCoupons::CouponId).integer().not_null())
                        .col(
                            ColumnDef::new(CartCoupons::AppliedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_coupons_cart_session_id")
                                .from(CartCoupons::Table, CartCoupons::CartSessionId)
                                .to(CartSessions::Table, CartSessions::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_coupons_coupon_id")
                                .from(CartCoupons::Table, CartCoupons::CouponId)
                                .to(Coupons::Table, Coupons::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_cart_coupons_cart_session_id")
                        .table(CartCoupons::Table)
                        .col(CartCoupons::CartSessionId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartCoupons::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CartSessions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum CartSessions {
        Table,
        Id,
        ExpiresAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum CartItems {
        Table,
        Id,
        CartSessionId,
        ProductId,
        ProductVariantId,
        Quantity,
        Price,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum Coupons {
        Table,
        Id,
        Code,
        CouponType,
        Value,
        MinimumAmount,
        UsageLimit,
        UsageCount,
        StartsAt,
        ExpiresAt,
        IsActive,
    }

    #[derive(DeriveIden)]
    pub enum CartCoupons {
        Table,
        Id,
        CartSessionId,
        CouponId,
        AppliedAt,
    }
}

mod m20240301_000005_create_order_tables {
    use super::m20240301_000004_create_cart_tables::Coupons;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Orders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Orders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(Orders::GuestEmail).string().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Orders::PaymentStatus)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::FulfillmentStatus)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::Currency).string_len(3).not_null())
                        .col(
                            ColumnDef::new(Orders::Subtotal)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::TaxAmount)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::ShippingAmount)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DiscountAmount)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::BillingAddress).json().not_null())
                        .col(ColumnDef::new(Orders::ShippingAddress).json().not_null())
                        .col(ColumnDef::new(Orders::ShippingMethod).string())
                        .col(ColumnDef::new(Orders::TrackingNumber).string())
                        .col(ColumnDef::new(Orders::Notes).text())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_order_number")
                        .table(Orders::Table)
                        .col(Orders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).integer().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).integer().not_null())
                        .col(ColumnDef::new(OrderItems::ProductVariantId).integer())
                        .col(ColumnDef::new(OrderItems::ProductName).string().not_null())
                        .col(ColumnDef::new(OrderItems::ProductSku).string().not_null())
                        .col(ColumnDef::new(OrderItems::VariantName).string())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::Price)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::Total)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CouponUsage::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CouponUsage::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(CouponUsage::CouponId).integer().not_null())
                        .col(ColumnDef::new(CouponUsage::OrderId).integer().not_null())
                        .col(
                            ColumnDef::new(CouponUsage::DiscountAmount)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CouponUsage::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_coupon_usage_coupon_id")
                                .from(CouponUsage::Table, CouponUsage::CouponId)
                                .to(Coupons::Table, Coupons::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_coupon_usage_order_id")
                                .from(CouponUsage::Table, CouponUsage::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CouponUsage::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Orders {
        Table,
        Id,
        OrderNumber,
        GuestEmail,
        Status,
        PaymentStatus,
        FulfillmentStatus,
        Currency,
        Subtotal,
        TaxAmount,
        ShippingAmount,
        DiscountAmount,
        TotalAmount,
        BillingAddress,
        ShippingAddress,
        ShippingMethod,
        TrackingNumber,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        ProductVariantId,
        ProductName,
        ProductSku,
        VariantName,
        Quantity,
        Price,
        Total,
    }

    #[derive(DeriveIden)]
    pub enum CouponUsage {
        Table,
        Id,
        CouponId,
        OrderId,
        DiscountAmount,
        CreatedAt,
    }
}

mod m20240301_000006_create_inventory_movements_table {
    use super::m20240301_000003_create_catalog_tables::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_inventory_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryMovements::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::ProductId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryMovements::ProductVariantId).integer())
                        .col(
                            ColumnDef::new(InventoryMovements::MovementType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::QuantityChange)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::QuantityAfter)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryMovements::ReferenceType).string())
                        .col(ColumnDef::new(InventoryMovements::ReferenceId).integer())
                        .col(
                            ColumnDef::new(InventoryMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_movements_product_id")
                                .from(InventoryMovements::Table, InventoryMovements::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_inventory_movements_product_id")
                        .table(InventoryMovements::Table)
                        .col(InventoryMovements::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum InventoryMovements {
        Table,
        Id,
        ProductId,
        ProductVariantId,
        MovementType,
        QuantityChange,
        QuantityAfter,
        ReferenceType,
        ReferenceId,
        CreatedAt,
    }
}

mod m20240301_000007_create_payment_transactions_table {
    use super::m20240301_000005_create_order_tables::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000007_create_payment_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentTransactions::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::OrderId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::TransactionId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::PaymentMethod)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::Amount)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::Currency)
                                .string_len(3)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentTransactions::GatewayTransactionId).string())
                        .col(ColumnDef::new(PaymentTransactions::GatewayResponse).json())
                        .col(
                            ColumnDef::new(PaymentTransactions::ProcessedAt)
                                .timestamp_with_time_zone(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payment_transactions_order_id")
                                .from(PaymentTransactions::Table, PaymentTransactions::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_payment_transactions_transaction_id")
                        .table(PaymentTransactions::Table)
                        .col(PaymentTransactions::TransactionId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum PaymentTransactions {
        Table,
        Id,
        OrderId,
        TransactionId,
        PaymentMethod,
        Status,
        Amount,
        Currency,
        GatewayTransactionId,
        GatewayResponse,
        ProcessedAt,
        CreatedAt,
    }
}
