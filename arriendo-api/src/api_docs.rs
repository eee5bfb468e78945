use crate::handlers::{commands, instance_types, payments, pricing, requests, servers};
use arriendo_common::pricing::{DesgloseCosto, TarifasVigentes};
use arriendo_common::sizing::FieldError;
use arriendo_common::{
    Connectivity, DiskType, InstanceType, PagoMensual, PaymentMethod, PaymentStatus,
    RequestStatus, Server, ServerSizing, ServerStatus, SolicitudServidor,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        // Pricing
        pricing::get_rates,
        pricing::estimate,
        // Catalog
        instance_types::list_instance_types,
        instance_types::update_instance_type,
        // Requests
        requests::create_request,
        requests::list_requests,
        requests::approve_request,
        requests::reject_request,
        // Servers
        servers::list_servers,
        servers::get_server,
        servers::transition_server,
        servers::list_server_payments,
        // Payments
        payments::create_payment,
        payments::register_payment,
        // Commands
        commands::manual_reconcile_trigger
    ),
    components(
        schemas(
            DesgloseCosto,
            TarifasVigentes,
            FieldError,
            InstanceType,
            Server,
            ServerStatus,
            ServerSizing,
            DiskType,
            Connectivity,
            PagoMensual,
            PaymentStatus,
            PaymentMethod,
            SolicitudServidor,
            RequestStatus,
            pricing::EstimateRequest,
            instance_types::UpdateInstanceTypeRequest,
            requests::CreateRequestBody,
            requests::RejectRequestBody,
            requests::ApproveResponse,
            servers::ServerView,
            servers::TransitionRequest,
            payments::CreatePaymentRequest,
            payments::RegisterPaymentRequest,
            commands::ReconcileRequest
        )
    ),
    tags(
        (name = "Pricing", description = "Daily cost estimation"),
        (name = "Catalog", description = "Instance types"),
        (name = "Requests", description = "Server requests and their review"),
        (name = "Servers", description = "Server lifecycle and active time"),
        (name = "Payments", description = "Monthly invoices"),
        (name = "Commands", description = "Billing service commands")
    )
)]
pub struct ApiDoc;
