use axum::{
    response::Html,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::{api, AppState};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Dashboard page
        .route("/", get(serve_dashboard))
        .route("/api/health", get(api::health_check))
        // Account endpoints
        .route("/api/auth/signup", post(api::post_signup))
        .route("/api/auth/login", post(api::post_login))
        .route("/api/auth/logout", post(api::post_logout))
        .route("/api/settings/username", put(api::put_username))
        // Data endpoints
        .route("/api/history", get(api::get_history))
        .route("/api/predict", post(api::post_predict))
        .route("/api/alert", get(api::get_alert))
        .route("/api/recommendation", get(api::get_recommendation))
        .route("/api/quote", get(api::get_quote))
        .layer(cors)
        .with_state(state)
}

pub async fn start_dashboard_server(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.settings.server.host, state.settings.server.port).parse()?;
    let app = router(state);

    info!("Dashboard server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

const DASHBOARD_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Stock Price Visualizer</title>
    <script src="https://cdn.jsdelivr.net/npm/chart.js"></script>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #0f1419;
            color: #e7e9ea;
            min-height: 100vh;
        }
        .header {
            background: #16202a;
            padding: 1rem 2rem;
            border-bottom: 1px solid #2f3336;
            display: flex;
            justify-content: space-between;
            align-items: center;
        }
        .header h1 { font-size: 1.5rem; color: #1da1f2; }
        .container { padding: 1.5rem; max-width: 1200px; margin: 0 auto; }
        .card {
            background: #16202a;
            border-radius: 12px;
            padding: 1.5rem;
            border: 1px solid #2f3336;
            margin-bottom: 1.5rem;
        }
        .section-title { font-size: 1.25rem; font-weight: 600; margin-bottom: 1rem; }
        .row { display: flex; gap: 0.75rem; flex-wrap: wrap; align-items: center; margin-bottom: 1rem; }
        input, select {
            background: #1c2732; color: #e7e9ea;
            border: 1px solid #2f3336; border-radius: 6px;
            padding: 0.5rem 0.75rem; font-size: 0.875rem;
        }
        button {
            background: #1da1f2; color: #fff; border: none; border-radius: 6px;
            padding: 0.5rem 1rem; font-weight: 600; cursor: pointer;
        }
        button.secondary { background: #2f3336; }
        .view-nav {
            background: #16202a; border-bottom: 1px solid #2f3336;
            padding: 0 2rem; display: flex; gap: 0.5rem;
        }
        .view-tab {
            padding: 1rem 1.5rem; background: none; border: none; border-radius: 0;
            color: #71767b; font-size: 0.875rem; border-bottom: 2px solid transparent;
        }
        .view-tab.active { color: #1da1f2; border-bottom-color: #1da1f2; }
        .view { display: none; }
        .view.active { display: block; }
        .message { margin-top: 0.5rem; font-size: 0.875rem; white-space: pre-wrap; }
        .error { color: #f4212e; }
        .success { color: #00ba7c; }
        .chart-container { height: 400px; position: relative; }
        .hidden { display: none; }
    </style>
</head>
<body>
    <div class="header">
        <h1>Stock Price Visualizer</h1>
        <div id="user-box" class="row hidden">
            <span id="welcome"></span>
            <button class="secondary" onclick="logout()">Logout</button>
        </div>
    </div>

    <div id="auth" class="container">
        <div class="card">
            <div class="section-title">Login</div>
            <div class="row">
                <input id="login-username" placeholder="Username">
                <input id="login-password" type="password" placeholder="Password">
                <button onclick="login()">Login</button>
            </div>
            <div id="login-msg" class="message"></div>
        </div>
        <div class="card">
            <div class="section-title">Signup</div>
            <div class="row">
                <input id="signup-username" placeholder="Username">
                <input id="signup-password" type="password" placeholder="Password">
                <button onclick="signup()">Create Account</button>
            </div>
            <div id="signup-msg" class="message"></div>
        </div>
    </div>

    <div id="app" class="hidden">
        <div class="view-nav">
            <button class="view-tab active" data-view="dashboard">Dashboard</button>
            <button class="view-tab" data-view="predictor">LSTM Predictor</button>
            <button class="view-tab" data-view="recommendation">AI Recommendation</button>
            <button class="view-tab" data-view="alerts">Alerts</button>
            <button class="view-tab" data-view="settings">Settings</button>
        </div>
        <div class="container">
            <div id="view-dashboard" class="view active card">
                <div class="row">
                    <input id="dash-ticker" value="AAPL">
                    <select id="dash-period">
                        <option>1mo</option><option>3mo</option><option>6mo</option><option>1y</option>
                    </select>
                    <button onclick="fetchHistory()">Fetch Data</button>
                </div>
                <div class="chart-container"><canvas id="history-chart"></canvas></div>
                <div id="dash-msg" class="message"></div>
            </div>

            <div id="view-predictor" class="view card">
                <div class="row">
                    <input id="lstm-ticker" value="AAPL">
                    <label>Days <input id="lstm-days" type="number" value="1" min="1" style="width:5rem"></label>
                    <button onclick="predict()">Predict</button>
                </div>
                <div id="lstm-msg" class="message"></div>
            </div>

            <div id="view-recommendation" class="view card">
                <div class="row">
                    <input id="ai-ticker" value="AAPL">
                    <button onclick="recommend()">Get Recommendation</button>
                </div>
                <div id="ai-msg" class="message"></div>
            </div>

            <div id="view-alerts" class="view card">
                <div class="row">
                    <input id="alert-ticker" value="AAPL">
                    <input id="alert-threshold" value="200.0">
                    <button onclick="checkAlert()">Check Alert</button>
                </div>
                <div id="alert-msg" class="message"></div>
            </div>

            <div id="view-settings" class="view card">
                <div class="section-title">Change Username</div>
                <div class="row">
                    <input id="settings-username" placeholder="New Username">
                    <button onclick="rename()">Update Username</button>
                </div>
                <div id="settings-msg" class="message"></div>
            </div>
        </div>
    </div>

    <script>
        let token = sessionStorage.getItem('token');
        let username = sessionStorage.getItem('username');
        let chart = null;

        function show(id, text, ok) {
            const el = document.getElementById(id);
            el.textContent = text;
            el.className = 'message ' + (ok ? 'success' : 'error');
        }

        async function api(method, path, body) {
            const headers = { 'Content-Type': 'application/json' };
            if (token) headers['Authorization'] = 'Bearer ' + token;
            const resp = await fetch(path, { method, headers, body: body ? JSON.stringify(body) : undefined });
            const data = await resp.json().catch(() => ({}));
            if (resp.status === 401 && token && path !== '/api/auth/login') {
                setSession(null, null);
            }
            return { ok: resp.ok, data };
        }

        function setSession(t, u) {
            token = t; username = u;
            if (t) {
                sessionStorage.setItem('token', t);
                sessionStorage.setItem('username', u);
            } else {
                sessionStorage.clear();
            }
            render();
        }

        function render() {
            const loggedIn = !!token;
            document.getElementById('auth').classList.toggle('hidden', loggedIn);
            document.getElementById('app').classList.toggle('hidden', !loggedIn);
            document.getElementById('user-box').classList.toggle('hidden', !loggedIn);
            document.getElementById('welcome').textContent = loggedIn ? 'Welcome, ' + username : '';
        }

        document.querySelectorAll('.view-tab').forEach(tab => {
            tab.addEventListener('click', () => {
                document.querySelectorAll('.view-tab').forEach(t => t.classList.remove('active'));
                document.querySelectorAll('.view').forEach(v => v.classList.remove('active'));
                tab.classList.add('active');
                document.getElementById('view-' + tab.dataset.view).classList.add('active');
            });
        });

        async function login() {
            const u = document.getElementById('login-username').value;
            const p = document.getElementById('login-password').value;
            const { ok, data } = await api('POST', '/api/auth/login', { username: u, password: p });
            if (ok) setSession(data.token, data.username);
            else show('login-msg', data.error, false);
        }

        async function signup() {
            const u = document.getElementById('signup-username').value;
            const p = document.getElementById('signup-password').value;
            const { ok, data } = await api('POST', '/api/auth/signup', { username: u, password: p });
            show('signup-msg', ok ? data.message : data.error, ok);
        }

        async function logout() {
            await api('POST', '/api/auth/logout');
            setSession(null, null);
        }

        async function fetchHistory() {
            const t = document.getElementById('dash-ticker').value;
            const p = document.getElementById('dash-period').value;
            const { ok, data } = await api('GET', `/api/history?ticker=${encodeURIComponent(t)}&period=${p}`);
            if (!ok) { show('dash-msg', data.error, false); return; }
            show('dash-msg', '', true);

            const labels = data.timestamps.map(ts => ts.slice(0, 10));
            const num = v => v === null ? null : Number(v);
            const datasets = [{ label: 'Close', data: data.close.map(num), borderColor: '#1da1f2', pointRadius: 0 }];
            const colors = ['#00ba7c', '#ffd400', '#f91880', '#7856ff'];
            data.columns.forEach((c, i) => datasets.push({
                label: c.name, data: c.values.map(num), borderColor: colors[i % colors.length], pointRadius: 0
            }));

            if (chart) chart.destroy();
            chart = new Chart(document.getElementById('history-chart'), {
                type: 'line',
                data: { labels, datasets },
                options: { maintainAspectRatio: false, spanGaps: false }
            });
        }

        async function predict() {
            const t = document.getElementById('lstm-ticker').value;
            const d = Number(document.getElementById('lstm-days').value);
            show('lstm-msg', 'Training...', true);
            const { ok, data } = await api('POST', '/api/predict', { ticker: t, days: d });
            show('lstm-msg', ok ? data.predictions.map(p => p.toFixed(2)).join('\n') : data.error, ok);
        }

        async function recommend() {
            const t = document.getElementById('ai-ticker').value;
            const { ok, data } = await api('GET', `/api/recommendation?ticker=${encodeURIComponent(t)}`);
            show('ai-msg', ok ? data.text : data.error, ok);
        }

        async function checkAlert() {
            const t = document.getElementById('alert-ticker').value;
            const th = document.getElementById('alert-threshold').value;
            const { ok, data } = await api('GET', `/api/alert?ticker=${encodeURIComponent(t)}&threshold=${encodeURIComponent(th)}`);
            show('alert-msg', ok ? data.message : data.error, ok && data.outcome && data.outcome.type !== 'FetchFailed');
        }

        async function rename() {
            const n = document.getElementById('settings-username').value;
            const { ok, data } = await api('PUT', '/api/settings/username', { new_username: n });
            if (ok) {
                setSession(token, data.username);
                show('settings-msg', data.message, true);
            } else {
                show('settings-msg', data.error, false);
            }
        }

        render();
    </script>
</body>
</html>
"##;
