use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_locations_table::Migration),
            Box::new(m20240101_000002_create_products_table::Migration),
            Box::new(m20240101_000003_create_stock_batches_table::Migration),
            Box::new(m20240101_000004_create_sales_records_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_locations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_locations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Locations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Locations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Locations::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Locations::Name).string().not_null())
                        .col(ColumnDef::new(Locations::Kind).string().not_null())
                        .col(ColumnDef::new(Locations::ParentId).uuid().null())
                        .col(
                            ColumnDef::new(Locations::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Locations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Locations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_locations_parent_id")
                        .table(Locations::Table)
                        .col(Locations::ParentId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Locations::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Locations {
        Table,
        Id,
        Code,
        Name,
        Kind,
        ParentId,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::Sku)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Unit).string().not_null())
                        .col(ColumnDef::new(Products::ShelfLifeDays).integer().null())
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
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Products {
        Table,
        Id,
        Sku,
        Name,
        Unit,
        ShelfLifeDays,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_stock_batches_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_stock_batches_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockBatches::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockBatches::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockBatches::BatchNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBatches::QuantityOnHand)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockBatches::QuantityReserved)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockBatches::UnitCost)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBatches::ManufacturedDate)
                                .date()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockBatches::ExpiryDate).date().not_null())
                        .col(
                            ColumnDef::new(StockBatches::QualityStatus)
                                .string()
                                .not_null()
                                .default("OK"),
                        )
                        .col(
                            ColumnDef::new(StockBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBatches::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // A batch number identifies one lot within (location, product);
            // transfer credits rely on this to merge instead of fragmenting.
            manager
                .create_index(
                    Index::create()
                        .name("idx_stock_batches_location_product_batch_no")
                        .table(StockBatches::Table)
                        .col(StockBatches::LocationId)
                        .col(StockBatches::ProductId)
                        .col(StockBatches::BatchNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // Allocation candidates are read in expiry order.
            manager
                .create_index(
                    Index::create()
                        .name("idx_stock_batches_location_product_expiry")
                        .table(StockBatches::Table)
                        .col(StockBatches::LocationId)
                        .col(StockBatches::ProductId)
                        .col(StockBatches::ExpiryDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockBatches::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum StockBatches {
        Table,
        Id,
        ProductId,
        LocationId,
        BatchNumber,
        QuantityOnHand,
        QuantityReserved,
        UnitCost,
        ManufacturedDate,
        ExpiryDate,
        QualityStatus,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_sales_records_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_sales_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesRecords::LocationId).uuid().not_null())
                        .col(ColumnDef::new(SalesRecords::ProductId).uuid().not_null())
                        .col(ColumnDef::new(SalesRecords::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(SalesRecords::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesRecords::Currency).string().not_null())
                        .col(
                            ColumnDef::new(SalesRecords::SaleDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesRecords::SoldBy).string().not_null())
                        .col(
                            ColumnDef::new(SalesRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_sales_records_location_product")
                        .table(SalesRecords::Table)
                        .col(SalesRecords::LocationId)
                        .col(SalesRecords::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesRecords::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum SalesRecords {
        Table,
        Id,
        LocationId,
        ProductId,
        Quantity,
        UnitPrice,
        Currency,
        SaleDate,
        SoldBy,
        CreatedAt,
    }
}
