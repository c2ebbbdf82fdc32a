//! Table and column identifiers for query building.

use sea_query::Iden;

#[derive(Iden)]
pub enum Customers {
    Table,
    CustomerId,
    FirstName,
    LastName,
}

#[derive(Iden)]
pub enum Products {
    Table,
    ProductId,
    ProductName,
    Category,
}

#[derive(Iden)]
pub enum Transactions {
    Table,
    TransactionId,
    CustomerId,
    ProductId,
    TransactionDate,
    TotalAmount,
}

/// Per-customer totals over every transaction.
#[derive(Iden)]
pub enum CustomerSales {
    Table,
    CustomerId,
    CustomerName,
    TotalSpent,
    NumTransactions,
}

#[derive(Iden)]
pub enum TopProducts {
    Table,
    ProductId,
    ProductName,
    TotalRevenue,
    NumTransactions,
}

#[derive(Iden)]
pub enum MonthlySales {
    Table,
    Month,
    TotalSales,
}

#[derive(Iden)]
pub enum TopCustomers {
    Table,
    CustomerId,
    CustomerName,
    TotalSpent,
}

#[derive(Iden)]
pub enum CategorySales {
    Table,
    Category,
    TotalSales,
}
