use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_divisions_table::Migration),
            Box::new(m20250101_000002_create_items_table::Migration),
            Box::new(m20250101_000003_create_locations_table::Migration),
            Box::new(m20250101_000004_create_projects_table::Migration),
            Box::new(m20250101_000005_create_stock_table::Migration),
            Box::new(m20250101_000006_create_transactions_table::Migration),
            Box::new(m20250101_000007_create_sync_ops_table::Migration),
        ]
    }
}

mod m20250101_000001_create_divisions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_divisions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Divisions::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Divisions::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Divisions::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Divisions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Divisions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Divisions {
        Table,
        Id,
        Name,
        CreatedAt,
    }
}

mod m20250101_000002_create_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000002_create_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Items::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Items::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Items::Sku).string().not_null().unique_key())
                        .col(ColumnDef::new(Items::Name).string().not_null())
                        .col(ColumnDef::new(Items::Barcode).string().null())
                        .col(
                            ColumnDef::new(Items::ReorderLevel)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Items::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Items::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Items::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_items_barcode")
                        .table(Items::Table)
                        .col(Items::Barcode)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_items_updated_at")
                        .table(Items::Table)
                        .col(Items::UpdatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Items::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Items {
        Table,
        Id,
        Sku,
        Name,
        Barcode,
        ReorderLevel,
        IsDeleted,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000003_create_locations_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000003_create_locations_table"
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
                        .col(ColumnDef::new(Locations::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Locations::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Locations::Name).string().not_null())
                        .col(
                            ColumnDef::new(Locations::Kind)
                                .string_len(16)
                                .not_null()
                                .default("WAREHOUSE"),
                        )
                        .col(ColumnDef::new(Locations::DivisionId).uuid().null())
                        .col(
                            ColumnDef::new(Locations::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
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
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_locations_division_id")
                                .from(Locations::Table, Locations::DivisionId)
                                .to(Divisions::Table, Divisions::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_locations_division_id")
                        .table(Locations::Table)
                        .col(Locations::DivisionId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_locations_updated_at")
                        .table(Locations::Table)
                        .col(Locations::UpdatedAt)
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

    #[derive(DeriveIden)]
    enum Locations {
        Table,
        Id,
        Code,
        Name,
        Kind,
        DivisionId,
        IsDeleted,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Divisions {
        Table,
        Id,
    }
}

mod m20250101_000004_create_projects_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000004_create_projects_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Projects::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Projects::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Projects::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Projects::Name).string().not_null())
                        .col(ColumnDef::new(Projects::DivisionId).uuid().not_null())
                        .col(
                            ColumnDef::new(Projects::LocationId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Projects::CreatedById).uuid().not_null())
                        .col(
                            ColumnDef::new(Projects::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Projects::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_projects_division_id")
                                .from(Projects::Table, Projects::DivisionId)
                                .to(Divisions::Table, Divisions::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_projects_location_id")
                                .from(Projects::Table, Projects::LocationId)
                                .to(Locations::Table, Locations::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_projects_division_id")
                        .table(Projects::Table)
                        .col(Projects::DivisionId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Projects::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Projects {
        Table,
        Id,
        Code,
        Name,
        DivisionId,
        LocationId,
        CreatedById,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Divisions {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Locations {
        Table,
        Id,
    }
}

mod m20250101_000005_create_stock_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000005_create_stock_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Stock::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Stock::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Stock::ItemId).uuid().not_null())
                        .col(ColumnDef::new(Stock::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(Stock::Qty)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Stock::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_item_id")
                                .from(Stock::Table, Stock::ItemId)
                                .to(Items::Table, Items::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_location_id")
                                .from(Stock::Table, Stock::LocationId)
                                .to(Locations::Table, Locations::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // One balance row per (item, location); upserts conflict on this key
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("uq_stock_item_location")
                        .table(Stock::Table)
                        .col(Stock::ItemId)
                        .col(Stock::LocationId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_location_id")
                        .table(Stock::Table)
                        .col(Stock::LocationId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_updated_at")
                        .table(Stock::Table)
                        .col(Stock::UpdatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Stock::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Stock {
        Table,
        Id,
        ItemId,
        LocationId,
        Qty,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Items {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Locations {
        Table,
        Id,
    }
}

mod m20250101_000006_create_transactions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000006_create_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Transactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Transactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::OfflineOpId)
                                .string()
                                .null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Transactions::Type).string_len(32).not_null())
                        .col(ColumnDef::new(Transactions::ItemId).uuid().not_null())
                        .col(ColumnDef::new(Transactions::Qty).integer().not_null())
                        .col(ColumnDef::new(Transactions::SrcLocationId).uuid().null())
                        .col(ColumnDef::new(Transactions::DstLocationId).uuid().null())
                        .col(ColumnDef::new(Transactions::ProjectId).uuid().null())
                        .col(ColumnDef::new(Transactions::Note).text().null())
                        .col(
                            ColumnDef::new(Transactions::IsFree)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Transactions::UnitPrice)
                                .decimal_len(12, 2)
                                .null(),
                        )
                        .col(ColumnDef::new(Transactions::CreatedById).uuid().not_null())
                        .col(
                            ColumnDef::new(Transactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_transactions_item_id")
                                .from(Transactions::Table, Transactions::ItemId)
                                .to(Items::Table, Items::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_transactions_src_location_id")
                                .from(Transactions::Table, Transactions::SrcLocationId)
                                .to(Locations::Table, Locations::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_transactions_dst_location_id")
                                .from(Transactions::Table, Transactions::DstLocationId)
                                .to(Locations::Table, Locations::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_transactions_project_id")
                                .from(Transactions::Table, Transactions::ProjectId)
                                .to(Projects::Table, Projects::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_created_at")
                        .table(Transactions::Table)
                        .col(Transactions::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_item_id")
                        .table(Transactions::Table)
                        .col(Transactions::ItemId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Transactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Transactions {
        Table,
        Id,
        OfflineOpId,
        Type,
        ItemId,
        Qty,
        SrcLocationId,
        DstLocationId,
        ProjectId,
        Note,
        IsFree,
        UnitPrice,
        CreatedById,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Items {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Locations {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Projects {
        Table,
        Id,
    }
}

mod m20250101_000007_create_sync_ops_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000007_create_sync_ops_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SyncOps::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SyncOps::Id)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SyncOps::UserId).uuid().not_null())
                        .col(ColumnDef::new(SyncOps::Kind).string_len(16).not_null())
                        .col(
                            ColumnDef::new(SyncOps::Outcome)
                                .string_len(16)
                                .not_null()
                                .default("applied"),
                        )
                        .col(ColumnDef::new(SyncOps::ErrorKind).string_len(32).null())
                        .col(ColumnDef::new(SyncOps::Reason).text().null())
                        .col(
                            ColumnDef::new(SyncOps::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sync_ops_outcome")
                        .table(SyncOps::Table)
                        .col(SyncOps::Outcome)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SyncOps::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SyncOps {
        Table,
        Id,
        UserId,
        Kind,
        Outcome,
        ErrorKind,
        Reason,
        CreatedAt,
    }
}
